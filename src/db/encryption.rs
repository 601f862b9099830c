//! At-rest encryption of the store file.
//!
//! Encryption is provided by SQLCipher when the crate is built with the
//! `encryption` feature. Without it every conversion returns
//! [`StoreError::EncryptionUnavailable`], which callers treat as non-fatal,
//! while opening a file that is not plaintext SQLite fails with
//! [`StoreError::UnreadableWithoutEncryption`].
//!
//! Conversions never modify the live file in place: the new file is written
//! next to it (`<file>.encrypting`, `<file>.recreate`) and renamed over the
//! original only once complete. [`remove_stale_artifacts`] cleans up after a
//! conversion that was interrupted.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::error::{EntityKind, Result, StoreError};
use super::workspaces::WORKSPACE_COLUMNS;
use super::{configure_connection, schema, Database, Handle, Op};

/// Magic bytes at the start of every plaintext SQLite file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

const ENCRYPTING_SUFFIX: &str = "encrypting";
const REKEYING_SUFFIX: &str = "rekeying";
const RECREATE_SUFFIX: &str = "recreate";

/// Encryption status of an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionState {
    /// Plaintext, and this build cannot encrypt.
    UnencryptedUnsupported,
    /// Plaintext, can be converted with [`Database::encrypt_database`].
    Unencrypted,
    Encrypted,
}

/// Whether this build links SQLCipher. Checked once per process.
pub fn encryption_supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| cfg!(feature = "encryption") && cipher_version().is_some())
}

fn cipher_version() -> Option<String> {
    let conn = Connection::open_in_memory().ok()?;
    conn.query_row("PRAGMA cipher_version", [], |row| row.get::<_, String>(0))
        .optional()
        .ok()
        .flatten()
}

/// `<file>.<suffix>`, plus `extra` (`-wal`, `-shm`) when given.
fn sibling(path: &Path, suffix: &str, extra: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    if !suffix.is_empty() {
        name.push(".");
        name.push(suffix);
    }
    name.push(extra);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove a database file together with its WAL and shared-memory files.
fn remove_database_files(path: &Path) -> Result<()> {
    for extra in ["", "-wal", "-shm"] {
        remove_if_exists(&sibling(path, "", extra))?;
    }
    Ok(())
}

/// Delete leftovers of an interrupted conversion of `path`.
pub(crate) fn remove_stale_artifacts(path: &Path) -> Result<()> {
    for suffix in [ENCRYPTING_SUFFIX, REKEYING_SUFFIX, RECREATE_SUFFIX] {
        for extra in ["", "-wal", "-shm"] {
            let stale = sibling(path, suffix, extra);
            if remove_if_exists(&stale)? {
                tracing::warn!(path = %stale.display(), "Removed stale conversion artifact");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Missing,
    Plaintext,
    /// Not a plaintext SQLite file; SQLCipher output or something else.
    Opaque,
    /// Shorter than a SQLite header, so neither plaintext nor encrypted.
    Truncated,
}

fn file_kind(path: &Path) -> Result<FileKind> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileKind::Missing),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(FileKind::Missing);
    }

    let mut header = [0u8; 16];
    let kind = match file.read_exact(&mut header) {
        Ok(()) if &header == SQLITE_HEADER => FileKind::Plaintext,
        Ok(()) => FileKind::Opaque,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => FileKind::Truncated,
        Err(e) => return Err(e.into()),
    };
    Ok(kind)
}

/// First read on a freshly opened connection. With a wrong key this is
/// where SQLCipher reports "file is not a database".
fn probe(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

fn is_not_a_database(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::NotADatabase)
}

fn open_keyed(path: &Path, passphrase: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "key", passphrase)?;
    Ok(conn)
}

/// Open `path`, keying it first when it is encrypted.
///
/// Returns the configured connection and whether the file is encrypted.
/// A file that does not exist yet is created as plaintext.
pub(crate) fn open_connection(path: &Path, passphrase: Option<&str>) -> Result<(Connection, bool)> {
    match file_kind(path)? {
        FileKind::Missing => {
            let conn = Connection::open(path)?;
            configure_connection(&conn)?;
            Ok((conn, false))
        }
        FileKind::Plaintext => {
            let conn = Connection::open(path)?;
            probe(&conn).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            configure_connection(&conn)?;
            Ok((conn, false))
        }
        FileKind::Truncated => Err(StoreError::Corrupt(format!(
            "{} is shorter than a database header",
            path.display()
        ))),
        FileKind::Opaque => {
            if !encryption_supported() {
                return Err(StoreError::UnreadableWithoutEncryption);
            }
            let passphrase = passphrase.ok_or(StoreError::PassphraseRequired)?;
            let conn = open_keyed(path, passphrase)?;
            probe(&conn).map_err(|e| {
                if is_not_a_database(&e) {
                    StoreError::WrongPassphrase
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
            configure_connection(&conn)?;
            Ok((conn, true))
        }
    }
}

fn require_support() -> Result<()> {
    if encryption_supported() {
        Ok(())
    } else {
        Err(StoreError::EncryptionUnavailable)
    }
}

fn require_passphrase(passphrase: &str) -> Result<()> {
    if passphrase.is_empty() {
        return Err(StoreError::validation("passphrase", "must not be empty"));
    }
    Ok(())
}

fn file_path(handle: &Handle) -> Result<PathBuf> {
    handle
        .path
        .clone()
        .ok_or_else(|| StoreError::validation("path", "in-memory stores cannot be encrypted"))
}

/// Close the live connection, move `replacement` over `path` and open the
/// result with `passphrase`. If the move fails the untouched original is reopened.
fn swap_in(handle: &mut Handle, path: &Path, replacement: &Path, passphrase: &str) -> Result<()> {
    let placeholder = Connection::open_in_memory()?;
    let old = std::mem::replace(&mut handle.conn, placeholder);
    if let Err((conn, e)) = old.close() {
        handle.conn = conn;
        return Err(e.into());
    }

    // Closing the last connection checkpointed the WAL into the main file
    let moved = (|| -> Result<()> {
        remove_if_exists(&sibling(path, "", "-wal"))?;
        remove_if_exists(&sibling(path, "", "-shm"))?;
        fs::rename(replacement, path)?;
        Ok(())
    })();
    if let Err(e) = moved {
        if let Ok((conn, encrypted)) = open_connection(path, None) {
            handle.conn = conn;
            handle.encrypted = encrypted;
        }
        return Err(e);
    }

    let (conn, encrypted) = open_connection(path, Some(passphrase))?;
    handle.conn = conn;
    handle.encrypted = encrypted;
    Ok(())
}

impl Database {
    pub fn encryption_state(&self) -> EncryptionState {
        if self.is_encrypted() {
            EncryptionState::Encrypted
        } else if encryption_supported() {
            EncryptionState::Unencrypted
        } else {
            EncryptionState::UnencryptedUnsupported
        }
    }

    /// Convert a plaintext store into an encrypted one in place.
    ///
    /// The data is exported into `<file>.encrypting` under the new key, which
    /// then replaces the original file. Every clone of this handle continues
    /// on the encrypted connection.
    pub fn encrypt_database(&self, passphrase: &str) -> Result<()> {
        self.with_handle(Op::new("encrypt_database", EntityKind::Store), |handle| {
            require_support()?;
            require_passphrase(passphrase)?;
            let path = file_path(handle)?;
            if handle.encrypted {
                return Err(StoreError::validation("state", "database is already encrypted"));
            }

            let target = sibling(&path, ENCRYPTING_SUFFIX, "");
            remove_database_files(&target)?;

            let exported = (|| -> Result<()> {
                handle.conn.execute(
                    "ATTACH DATABASE ?1 AS encrypted KEY ?2",
                    (target.to_string_lossy().as_ref(), passphrase),
                )?;
                handle
                    .conn
                    .query_row("SELECT sqlcipher_export('encrypted')", [], |_| Ok(()))?;
                handle.conn.execute("DETACH DATABASE encrypted", [])?;
                Ok(())
            })();
            if let Err(e) = exported {
                let _ = handle.conn.execute("DETACH DATABASE encrypted", []);
                remove_database_files(&target)?;
                return Err(e);
            }

            swap_in(handle, &path, &target, passphrase)?;
            tracing::info!(path = %path.display(), "Encrypted database");
            Ok(())
        })
    }

    /// Replace an empty plaintext store with a fresh encrypted one.
    ///
    /// Refused while the store holds any goal, sprint or journal entry, since
    /// only workspaces and settings are carried over.
    pub fn recreate_encrypted_database(&self, passphrase: &str) -> Result<()> {
        self.with_handle(Op::new("recreate_encrypted_database", EntityKind::Store), |handle| {
            require_support()?;
            require_passphrase(passphrase)?;
            let path = file_path(handle)?;
            if handle.encrypted {
                return Err(StoreError::validation(
                    "state",
                    "database is already encrypted, use rekey_database",
                ));
            }

            let rows: i64 = handle.conn.query_row(
                "SELECT (SELECT COUNT(*) FROM goals)
                      + (SELECT COUNT(*) FROM sprints)
                      + (SELECT COUNT(*) FROM journal_entries)",
                [],
                |row| row.get(0),
            )?;
            if rows > 0 {
                return Err(StoreError::validation(
                    "state",
                    "database still holds goals, sprints or journal entries",
                ));
            }

            let target = sibling(&path, RECREATE_SUFFIX, "");
            remove_database_files(&target)?;

            let built = (|| -> Result<()> {
                let fresh = open_keyed(&target, passphrase)?;
                configure_connection(&fresh)?;
                schema::run_migrations(&fresh)?;

                // An empty key attaches the current file as plaintext
                fresh.execute(
                    "ATTACH DATABASE ?1 AS previous KEY ''",
                    [path.to_string_lossy().as_ref()],
                )?;
                fresh.execute_batch(&format!(
                    "INSERT INTO main.workspaces ({cols}) SELECT {cols} FROM previous.workspaces;
                     INSERT INTO main.settings (key, value) SELECT key, value FROM previous.settings;
                     DETACH DATABASE previous;",
                    cols = WORKSPACE_COLUMNS
                ))?;
                fresh.close().map_err(|(_, e)| e)?;
                Ok(())
            })();
            if let Err(e) = built {
                remove_database_files(&target)?;
                return Err(e);
            }

            swap_in(handle, &path, &target, passphrase)?;
            tracing::info!(path = %path.display(), "Recreated database with encryption");
            Ok(())
        })
    }

    /// Change the key of an encrypted store. Afterwards only `new_passphrase`
    /// opens it.
    pub fn rekey_database(&self, new_passphrase: &str) -> Result<()> {
        self.with_handle(Op::new("rekey_database", EntityKind::Store), |handle| {
            require_support()?;
            require_passphrase(new_passphrase)?;
            if !handle.encrypted {
                return Err(StoreError::validation(
                    "state",
                    "database is not encrypted, use encrypt_database",
                ));
            }

            // SQLCipher cannot rekey a database in WAL mode
            handle.conn.pragma_update(None, "journal_mode", "DELETE")?;
            let rekeyed = handle.conn.pragma_update(None, "rekey", new_passphrase);
            handle.conn.pragma_update(None, "journal_mode", "WAL")?;
            rekeyed?;

            tracing::info!("Rekeyed database");
            Ok(())
        })
    }
}
