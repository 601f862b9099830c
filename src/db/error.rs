use std::fmt;
use std::time::Duration;

use rusqlite::ErrorCode;
use uuid::Uuid;

/// Which kind of row an operation was acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Workspace,
    Day,
    Sprint,
    Goal,
    Dependency,
    JournalEntry,
    Setting,
    Store,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Day => "day",
            Self::Sprint => "sprint",
            Self::Goal => "goal",
            Self::Dependency => "dependency",
            Self::JournalEntry => "journal entry",
            Self::Setting => "setting",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the persistence layer.
///
/// Failures inside a repository operation come back wrapped in
/// [`StoreError::Op`], which names the operation, entity kind and id. Use
/// [`StoreError::cause`] to reach the underlying condition.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{op} {entity} {id}: {source}")]
    Op {
        op: &'static str,
        entity: EntityKind,
        id: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("circular dependency: goal {goal} cannot depend on {depends_on}")]
    CircularDependency { goal: Uuid, depends_on: Uuid },

    #[error("sprint {active} is already active in this workspace")]
    SprintAlreadyActive { active: Uuid },

    #[error("wrong passphrase for encrypted database")]
    WrongPassphrase,

    #[error("database is encrypted and no passphrase was given")]
    PassphraseRequired,

    #[error("database file is corrupt or not a database: {0}")]
    Corrupt(String),

    #[error("database encryption is not available in this build")]
    EncryptionUnavailable,

    /// Opening a file that is not plaintext SQLite on a build that cannot
    /// decrypt. The file may be encrypted or damaged; either way it is
    /// unusable here, so this is never treated as non-fatal.
    #[error("database file is encrypted or unreadable and this build cannot decrypt it")]
    UnreadableWithoutEncryption,

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: &'static str,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the persistence layer.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// The innermost error, with every [`StoreError::Op`] layer peeled off.
    pub fn cause(&self) -> &StoreError {
        match self {
            Self::Op { source, .. } => source.cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause(), Self::NotFound { .. })
    }

    pub fn is_circular_dependency(&self) -> bool {
        matches!(self.cause(), Self::CircularDependency { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause(), Self::Timeout { .. })
    }

    /// Whether the caller should ask for a (different) passphrase rather
    /// than report data loss.
    pub fn is_passphrase_problem(&self) -> bool {
        matches!(
            self.cause(),
            Self::WrongPassphrase | Self::PassphraseRequired
        )
    }

    /// Conditions a caller can degrade around instead of aborting: a
    /// conversion asked for encryption the build does not have, so the UI
    /// falls back to a passphrase lock without at-rest encryption.
    pub fn is_non_fatal(&self) -> bool {
        matches!(self.cause(), Self::EncryptionUnavailable)
    }

    /// True when SQLite reported that the statement was interrupted by the
    /// deadline progress handler.
    pub(crate) fn is_interrupt(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::OperationInterrupted
        )
    }
}
