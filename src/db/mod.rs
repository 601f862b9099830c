mod context;
mod days;
mod deps;
pub mod encryption;
mod error;
mod goals;
mod journal;
pub mod query;
mod rank;
mod schema;
mod settings;
mod snapshot;
mod sprints;
mod workspaces;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use uuid::Uuid;

pub use encryption::{encryption_supported, EncryptionState};
pub use error::{EntityKind, Result, StoreError};
pub use query::{GoalOrder, GoalPredicate, GoalQuery, SearchQuery, DEFAULT_SEARCH_LIMIT};
pub use settings::PASSPHRASE_HASH_KEY;
pub use snapshot::{ImportSummary, Snapshot};

pub(crate) use context::Op;

/// Default budget for a single repository operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to one goalstack store.
///
/// Cloning is cheap and every clone talks to the same connection, so the
/// handle can be passed to as many threads as needed. There is no global
/// store; callers own and thread this handle explicitly.
pub struct Database {
    inner: Arc<Mutex<Handle>>,
    op_timeout: Duration,
}

pub(crate) struct Handle {
    pub conn: Connection,
    /// `None` for in-memory stores.
    pub path: Option<PathBuf>,
    pub encrypted: bool,
}

impl Database {
    /// Open (or create) the store at `path`, then bring its schema up to date.
    ///
    /// `passphrase` is only used when the file turns out to be encrypted.
    /// Leftovers from an interrupted encryption are removed before opening.
    pub fn open(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        encryption::remove_stale_artifacts(&path)?;
        let (conn, encrypted) = encryption::open_connection(&path, passphrase)?;
        tracing::debug!(path = %path.display(), encrypted, "Opened database");

        let db = Self::from_handle(Handle {
            conn,
            path: Some(path),
            encrypted,
        });
        db.migrate()?;
        Ok(db)
    }

    /// Open a fresh, migrated in-memory store.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        let db = Self::from_handle(Handle {
            conn,
            path: None,
            encrypted: false,
        });
        db.migrate()?;
        Ok(db)
    }

    fn from_handle(handle: Handle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handle)),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// A handle to the same store whose operations use a different budget.
    pub fn with_op_timeout(&self, op_timeout: Duration) -> Self {
        Self {
            inner: self.inner.clone(),
            op_timeout,
        }
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Create missing tables and apply additive migrations. Idempotent.
    pub fn migrate(&self) -> Result<()> {
        let handle = self.lock();
        schema::run_migrations(&handle.conn)
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    pub fn is_encrypted(&self) -> bool {
        self.lock().encrypted
    }

    /// Unbounded wait for the handle. Repository operations go through
    /// [`Database::acquire`] instead.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Handle> {
        self.inner.lock()
    }

    /// Wait for the handle no longer than `budget`.
    pub(crate) fn try_lock_for(&self, budget: Duration) -> Option<MutexGuard<'_, Handle>> {
        self.inner.try_lock_for(budget)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            op_timeout: self.op_timeout,
        }
    }
}

/// Per-connection settings applied right after the key (if any).
pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(DEFAULT_OP_TIMEOUT)?;
    Ok(())
}

pub(crate) fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_date(s: String) -> NaiveDate {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").unwrap_or_default()
}

pub(crate) fn parse_string_list(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}

pub(crate) fn opt_uuid(id: Option<Uuid>) -> Option<String> {
    id.map(|u| u.to_string())
}

pub(crate) fn opt_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}
