//! Persistent key-value storage.
//!
//! Every stateful component (keypair, cached certificates, stored credential)
//! persists through the narrow [`KeyStore`] contract. Two backends ship with
//! the crate:
//!
//! - [`MemoryKeyStore`]: process-local, for tests and ephemeral sessions
//! - [`SqliteKeyStore`]: durable single-table store (WAL mode)

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// Abstract persistent key-value store.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKeyStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::KeyStore;
    use crate::error::{CoreError, Result};
    use async_trait::async_trait;
    use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::{debug, info};

    /// Durable store backed by a single SQLite table.
    ///
    /// Statements are tiny point reads and writes, so they run inline on the
    /// calling task behind a mutex.
    pub struct SqliteKeyStore {
        conn: Mutex<Connection>,
    }

    impl SqliteKeyStore {
        /// Create or open a store at `path`.
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            info!(path = %path.display(), "Opening key store");

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;

            Self::from_connection(conn)
        }

        /// Open a private in-memory database.
        pub fn open_in_memory() -> Result<Self> {
            Self::from_connection(Connection::open_in_memory()?)
        }

        fn from_connection(conn: Connection) -> Result<Self> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
                );
                "#,
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
            let conn = self
                .conn
                .lock()
                .map_err(|e| CoreError::Store(format!("Lock error: {}", e)))?;
            f(&conn)
        }
    }

    #[async_trait]
    impl KeyStore for SqliteKeyStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.with_conn(|conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv_entries WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?;
                Ok(value)
            })
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
            self.with_conn(|conn| {
                conn.execute(
                    r#"
                    INSERT INTO kv_entries (key, value, updated_at)
                    VALUES (?1, ?2, strftime('%s', 'now'))
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                    params![key, value],
                )?;
                debug!(key = %key, "Key store entry written");
                Ok(())
            })
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.with_conn(|conn| {
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
        }
    }
}
