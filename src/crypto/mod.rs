//! Cryptographic primitives.
//!
//! - [`passphrase`]: storing and verifying the app passphrase (Argon2id PHC
//!   strings, with transparent upgrade of legacy SHA-256 hashes)
//! - [`envelope`]: sealing exported vaults with ChaCha20-Poly1305 under an
//!   Argon2id-derived key
//!
//! At-rest database encryption is SQLCipher's job, see [`crate::db::encryption`].

pub mod envelope;
pub mod passphrase;
