//! Passphrase hashing and verification.
//!
//! New hashes are Argon2id PHC strings (`$argon2id$...`). Stores written by
//! older versions hold a bare hex SHA-256 digest; those still verify and are
//! reported as needing an upgrade.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};

use crate::db::{Result, StoreError};

/// What kind of hash a stored value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Argon2,
    LegacySha256,
    Unknown,
}

impl HashScheme {
    pub fn of(stored: &str) -> Self {
        if stored.starts_with("$argon2") {
            Self::Argon2
        } else if stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::LegacySha256
        } else {
            Self::Unknown
        }
    }
}

/// Outcome of checking a passphrase against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    /// Correct, but the stored hash uses the legacy scheme and should be
    /// replaced with [`hash_passphrase`].
    MatchNeedsUpgrade,
    Mismatch,
}

impl Verification {
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

/// Hash a passphrase using Argon2id.
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_passphrase(passphrase: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Crypto(format!("failed to hash passphrase: {e}")))
}

/// Hex SHA-256 digest, the scheme used before Argon2id.
pub fn legacy_hash(passphrase: &str) -> String {
    hex::encode(Sha256::digest(passphrase.as_bytes()))
}

pub fn verify_passphrase(passphrase: &str, stored: &str) -> Result<Verification> {
    match HashScheme::of(stored) {
        HashScheme::Argon2 => {
            let parsed = PasswordHash::new(stored)
                .map_err(|e| StoreError::Crypto(format!("invalid passphrase hash: {e}")))?;
            let ok = Argon2::default()
                .verify_password(passphrase.as_bytes(), &parsed)
                .is_ok();
            Ok(if ok {
                Verification::Match
            } else {
                Verification::Mismatch
            })
        }
        HashScheme::LegacySha256 => {
            let ok = legacy_hash(passphrase).eq_ignore_ascii_case(stored);
            Ok(if ok {
                Verification::MatchNeedsUpgrade
            } else {
                Verification::Mismatch
            })
        }
        HashScheme::Unknown => Err(StoreError::Crypto(
            "stored passphrase hash has an unknown format".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_passphrase("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert_eq!(
            verify_passphrase("correct-horse-battery-staple", &hash).unwrap(),
            Verification::Match
        );
        assert_eq!(
            verify_passphrase("wrong", &hash).unwrap(),
            Verification::Mismatch
        );
    }

    #[test]
    fn test_same_passphrase_gets_different_salts() {
        let a = hash_passphrase("same").unwrap();
        let b = hash_passphrase("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_hash_needs_upgrade() {
        let stored = legacy_hash("hunter2");
        assert_eq!(HashScheme::of(&stored), HashScheme::LegacySha256);
        assert_eq!(
            verify_passphrase("hunter2", &stored).unwrap(),
            Verification::MatchNeedsUpgrade
        );
        assert!(!verify_passphrase("hunter3", &stored).unwrap().is_match());
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        assert_eq!(HashScheme::of("plaintext"), HashScheme::Unknown);
        assert!(verify_passphrase("x", "plaintext").is_err());
    }
}
