//! Vault export and import.
//!
//! A vault is a JSON snapshot of the whole store:
//!
//! ```json
//! { "app_version": "0.3.2", "exported_at": "...", "workspaces": [...], "days": [...],
//!   "sprints": [...], "goals": [...], "journal_entries": [...], "task_deps": [...] }
//! ```
//!
//! Exported with a passphrase, the document is sealed and wrapped in an
//! envelope: `{ "encrypted": true, "app_version", "exported_at", "salt",
//! "nonce", "data" }`, the last three base64-encoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::envelope::{self, Sealed, NONCE_LEN, SALT_LEN};
use crate::db::{Database, Result, Snapshot, StoreError};

pub use crate::db::ImportSummary;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultDocument {
    pub app_version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEnvelope {
    pub encrypted: bool,
    pub app_version: String,
    pub exported_at: DateTime<Utc>,
    pub salt: String,
    pub nonce: String,
    pub data: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Seal the export when set.
    pub passphrase: Option<String>,
    pub pretty: bool,
}

impl ExportOptions {
    pub fn encrypted(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
            ..Self::default()
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn decode_fixed<const N: usize>(field: &str, encoded: &str) -> Result<[u8; N]> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::Crypto(format!("invalid base64 in {field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| StoreError::Crypto(format!("{field} must be {N} bytes")))
}

/// Serialize the whole store, sealed when `options.passphrase` is set.
pub fn export_vault(db: &Database, options: &ExportOptions) -> Result<String> {
    let document = VaultDocument {
        app_version: APP_VERSION.to_string(),
        exported_at: Utc::now(),
        data: db.snapshot()?,
    };

    let Some(passphrase) = options.passphrase.as_deref() else {
        return to_json(&document, options.pretty);
    };

    let sealed = envelope::seal(serde_json::to_string(&document)?.as_bytes(), passphrase)?;
    let wrapped = VaultEnvelope {
        encrypted: true,
        app_version: document.app_version,
        exported_at: document.exported_at,
        salt: STANDARD.encode(sealed.salt),
        nonce: STANDARD.encode(sealed.nonce),
        data: STANDARD.encode(&sealed.ciphertext),
    };
    to_json(&wrapped, options.pretty)
}

/// Parse a vault, opening the envelope first when it is sealed.
pub fn read_vault(payload: &str, passphrase: Option<&str>) -> Result<VaultDocument> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let sealed = value
        .get("encrypted")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if !sealed {
        return Ok(serde_json::from_value(value)?);
    }

    let wrapped: VaultEnvelope = serde_json::from_value(value)?;
    let passphrase = passphrase.ok_or(StoreError::PassphraseRequired)?;
    let sealed = Sealed {
        salt: decode_fixed::<SALT_LEN>("salt", &wrapped.salt)?,
        nonce: decode_fixed::<NONCE_LEN>("nonce", &wrapped.nonce)?,
        ciphertext: STANDARD
            .decode(&wrapped.data)
            .map_err(|e| StoreError::Crypto(format!("invalid base64 in data: {e}")))?,
    };
    let plaintext = envelope::open(&sealed, passphrase)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Add the contents of a vault to the store. See [`Database::import_snapshot`].
pub fn import_vault(db: &Database, payload: &str, passphrase: Option<&str>) -> Result<ImportSummary> {
    let document = read_vault(payload, passphrase)?;
    if document.app_version != APP_VERSION {
        tracing::info!(
            from = %document.app_version,
            to = APP_VERSION,
            "Importing vault written by another version"
        );
    }
    db.import_snapshot(&document.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_document_skips_missing_sections() {
        let doc = read_vault(
            r#"{"app_version":"0.1.0","exported_at":"2025-01-01T00:00:00Z","goals":[]}"#,
            None,
        )
        .unwrap();
        assert_eq!(doc.app_version, "0.1.0");
        assert!(doc.data.workspaces.is_empty());
    }

    #[test]
    fn test_sealed_document_needs_passphrase() {
        let db = Database::open_memory().unwrap();
        let sealed = export_vault(&db, &ExportOptions::encrypted("pw")).unwrap();

        let err = read_vault(&sealed, None).unwrap_err();
        assert!(matches!(err, StoreError::PassphraseRequired));
        let err = read_vault(&sealed, Some("nope")).unwrap_err();
        assert!(matches!(err, StoreError::WrongPassphrase));
        assert!(read_vault(&sealed, Some("pw")).is_ok());
    }

    #[test]
    fn test_envelope_fields() {
        let db = Database::open_memory().unwrap();
        let sealed = export_vault(&db, &ExportOptions::encrypted("pw")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&sealed).unwrap();

        assert_eq!(value["encrypted"], true);
        assert_eq!(value["app_version"], APP_VERSION);
        for field in ["salt", "nonce", "data"] {
            assert!(value[field].is_string(), "missing {field}");
        }
        assert!(value.get("goals").is_none());
    }
}
