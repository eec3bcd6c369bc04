//! SQLite store.
//!
//! Schema:
//! ```sql
//! CREATE TABLE destinations (port INTEGER PRIMARY KEY, count INTEGER NOT NULL)
//! ```
//! rusqlite is blocking, so every call runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::store::{StoreError, UsageStore};
use crate::usage::DestinationRecord;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS destinations (
    port  INTEGER PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0
)";

const UPSERT: &str = "INSERT INTO destinations (port, count) VALUES (?1, ?2)
    ON CONFLICT(port) DO UPDATE SET count = MAX(count, excluded.count)";

/// SQLite-backed usage store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = Connection::open(path)?;
            conn.execute(SCHEMA, [])?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<DestinationRecord> {
        Ok(DestinationRecord {
            identifier: u32::try_from(row.get::<_, i64>(0)?).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(e))
            })?,
            count: row.get::<_, i64>(1)?.max(0) as u64,
        })
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<Vec<DestinationRecord>, StoreError> {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            let mut stmt = conn.prepare("SELECT port, count FROM destinations")?;
            let records = stmt
                .query_map([], |row| Self::row_to_record(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await?
    }

    async fn upsert_count(&self, identifier: u32, count: u64) -> Result<(), StoreError> {
        let stored_count =
            i64::try_from(count).map_err(|_| StoreError::OutOfRange { identifier, count })?;

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            conn.execute(UPSERT, params![identifier as i64, stored_count])?;
            Ok(())
        })
        .await?
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_and_monotonic() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.upsert_count(8080, 3).await.unwrap();
        store.upsert_count(8080, 3).await.unwrap();
        store.upsert_count(8080, 2).await.unwrap();
        store.upsert_count(9090, 0).await.unwrap();

        let mut records = store.load_all().await.unwrap();
        records.sort_by_key(|r| r.identifier);
        assert_eq!(
            records,
            vec![DestinationRecord::new(8080, 3), DestinationRecord::new(9090, 0)]
        );
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.upsert_count(9000, 6).await.unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.load_all().await.unwrap(),
            vec![DestinationRecord::new(9000, 6)]
        );
    }

    #[tokio::test]
    async fn load_rejects_port_outside_u32() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("INSERT INTO destinations (port, count) VALUES (-1, 3)", [])
            .unwrap();

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, _))
        ));
    }

    #[tokio::test]
    async fn rejects_count_beyond_i64() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.upsert_count(1, u64::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { identifier: 1, .. }));
    }
}
