use rusqlite::{Connection, OptionalExtension};

use super::error::{EntityKind, Result};
use super::{Database, Op};
use crate::crypto::passphrase::{self, Verification};

/// Setting holding the hash of the app passphrase.
pub const PASSPHRASE_HASH_KEY: &str = "passphrase_hash";

fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

impl Database {
    // ============================================================
    // Settings
    // ============================================================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.read(Op::new("get_setting", EntityKind::Setting).id(key), |conn| {
            read_setting(conn, key)
        })
    }

    /// Insert or overwrite a setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.write(Op::new("set_setting", EntityKind::Setting).id(key), |tx| {
            write_setting(tx, key, value)
        })
    }

    /// Remove a setting. Returns whether it existed.
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        self.write(Op::new("delete_setting", EntityKind::Setting).id(key), |tx| {
            let rows = tx.execute("DELETE FROM settings WHERE key = ?", [key])?;
            Ok(rows > 0)
        })
    }

    // ============================================================
    // App passphrase
    // ============================================================

    /// Store an Argon2id hash of `passphrase`, replacing any previous one.
    pub fn set_passphrase(&self, passphrase: &str) -> Result<()> {
        let hash = passphrase::hash_passphrase(passphrase)?;
        self.set_setting(PASSPHRASE_HASH_KEY, &hash)
    }

    pub fn has_passphrase(&self) -> Result<bool> {
        Ok(self.get_setting(PASSPHRASE_HASH_KEY)?.is_some())
    }

    pub fn clear_passphrase(&self) -> Result<bool> {
        self.delete_setting(PASSPHRASE_HASH_KEY)
    }

    /// Check `passphrase` against the stored hash.
    ///
    /// Returns `false` when no passphrase is set. A match against a legacy
    /// SHA-256 hash rewrites it as Argon2id before returning.
    pub fn verify_passphrase(&self, passphrase: &str) -> Result<bool> {
        self.write(Op::new("verify_passphrase", EntityKind::Setting).id(PASSPHRASE_HASH_KEY), |tx| {
            let Some(stored) = read_setting(tx, PASSPHRASE_HASH_KEY)? else {
                return Ok(false);
            };

            match passphrase::verify_passphrase(passphrase, &stored)? {
                Verification::Match => Ok(true),
                Verification::MatchNeedsUpgrade => {
                    let upgraded = passphrase::hash_passphrase(passphrase)?;
                    write_setting(tx, PASSPHRASE_HASH_KEY, &upgraded)?;
                    tracing::info!("Upgraded legacy passphrase hash to Argon2id");
                    Ok(true)
                }
                Verification::Mismatch => Ok(false),
            }
        })
    }
}
