//! Passphrase-sealed blobs.
//!
//! - **Key Derivation**: Argon2id over the passphrase and a random salt
//! - **Encryption**: ChaCha20-Poly1305 with a random nonce per seal
//!
//! A wrong passphrase and a tampered ciphertext both fail authentication and
//! are reported as [`StoreError::WrongPassphrase`].

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::db::{Result, StoreError};

/// Argon2id memory cost in KiB (19 MiB)
pub const ARGON2_MEMORY_KB: u32 = 19_456;

pub const ARGON2_ITERATIONS: u32 = 2;

pub const ARGON2_PARALLELISM: u32 = 1;

pub const SALT_LEN: usize = 16;

pub const NONCE_LEN: usize = 12;

/// Output of [`seal`]. All three parts are needed to open it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let params = Params::new(ARGON2_MEMORY_KB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(32))
        .map_err(|e| StoreError::Crypto(format!("invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| StoreError::Crypto(format!("key derivation failed: {e}")))?;
    Ok(key)
}

pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Sealed> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| StoreError::Crypto(format!("encryption failed: {e}")))?;

    Ok(Sealed {
        salt,
        nonce,
        ciphertext,
    })
}

pub fn open(sealed: &Sealed, passphrase: &str) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, &sealed.salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map_err(|_| StoreError::WrongPassphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let sealed = seal(b"{\"goals\":[]}", "vault pass").unwrap();
        assert_ne!(sealed.ciphertext.as_slice(), b"{\"goals\":[]}");
        assert_eq!(open(&sealed, "vault pass").unwrap(), b"{\"goals\":[]}");
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = seal(b"secret", "right").unwrap();
        let err = open(&sealed, "wrong").unwrap_err();
        assert!(matches!(err, StoreError::WrongPassphrase));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = seal(b"secret", "right").unwrap();
        sealed.ciphertext[0] ^= 0xff;
        assert!(open(&sealed, "right").is_err());
    }
}
