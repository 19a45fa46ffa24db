//! Keyed blob cache for persisted per-document artifacts.
//!
//! The indexer and summarizer talk to an injectable [`BlobCache`] rather
//! than a concrete store: populated on first successful build, consulted
//! before every rebuild. Keys are derived from the document key plus a
//! suffix naming the artifact; values are opaque bytes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::CacheError;

/// Cache key for a document's persisted vector index.
#[must_use]
pub fn vector_index_key(doc_key: &str) -> String {
    format!("{doc_key}:vector-index")
}

/// Cache key for a document's persisted summary.
#[must_use]
pub fn summary_key(doc_key: &str) -> String {
    format!("{doc_key}:summary")
}

/// Hex SHA-256 of a document's text, stored alongside cached artifacts
/// so staleness is detected by content rather than by timestamp.
#[must_use]
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Injectable keyed blob store.
pub trait BlobCache: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backing store fails; a missing key
    /// is not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backing store fails.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;
}

/// Aggregate figures for the `status` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of stored blobs.
    pub entries: u64,
    /// Total stored payload size in bytes.
    pub total_bytes: u64,
}

/// SQLite-backed blob cache, the production implementation.
///
/// A single `blobs` table keyed by text; the connection sits behind a
/// mutex so the cache is usable from concurrent ingestion tasks.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens (or creates) a cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] when the file or schema cannot be
    /// created.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::Open {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| CacheError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::init(&conn).map_err(|e| CacheError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "opened blob cache");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory cache, mainly for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] when SQLite cannot allocate the
    /// in-memory database.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Open {
            path: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        Self::init(&conn).map_err(|e| CacheError::Open {
            path: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blobs (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
    }

    /// Returns entry count and total payload size.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] when the query fails.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Read {
            key: "<stats>".to_string(),
            message: "cache mutex poisoned".to_string(),
        })?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(value)), 0) FROM blobs",
            [],
            |row| {
                Ok(CacheStats {
                    entries: u64::try_from(row.get::<_, i64>(0)?).unwrap_or(0),
                    total_bytes: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                })
            },
        )
        .map_err(|e| CacheError::Read {
            key: "<stats>".to_string(),
            message: e.to_string(),
        })
    }
}

impl BlobCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Read {
            key: key.to_string(),
            message: "cache mutex poisoned".to_string(),
        })?;
        conn.query_row(
            "SELECT value FROM blobs WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(|e| CacheError::Read {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Write {
            key: key.to_string(),
            message: "cache mutex poisoned".to_string(),
        })?;
        conn.execute(
            "INSERT INTO blobs (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )
        .map(|_| ())
        .map_err(|e| CacheError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache")
            .field("conn", &"<rusqlite::Connection>")
            .finish()
    }
}

/// In-memory blob cache for tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Creates an empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Read {
            key: key.to_string(),
            message: "cache lock poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Write {
            key: key.to_string(),
            message: "cache lock poisoned".to_string(),
        })?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
