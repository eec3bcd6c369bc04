//! Durable storage for usage counts.
//!
//! # Data Flow
//! ```text
//! startup:   UsageStore::load_all → Vec<DestinationRecord> → registry
//! runtime:   UsageRecorder → UsageStore::upsert_count(port, count)
//! ```
//!
//! # Design Decisions
//! - Two operations only; the store is a black box behind the trait
//! - Upserts keep the larger of stored and written count, so concurrent
//!   writes that land out of order never move a durable count backwards
//! - Implementations own their synchronization; callers never hold the
//!   registry lock while talking to a store

pub mod json_file;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreConfig, StoreKind};
use crate::usage::DestinationRecord;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a usage store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("count {count} for port {identifier} does not fit the store")]
    OutOfRange { identifier: u32, count: u64 },
}

/// Persistence port for destination usage counts.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Read every known destination record.
    async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError>;

    /// Record `count` for `identifier`, creating the record if needed.
    ///
    /// Idempotent: repeating a write, or writing a count lower than the
    /// stored one, leaves the durable value unchanged.
    async fn upsert_count(&self, identifier: u32, count: u64) -> Result<(), StoreError>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Open the store described by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn UsageStore>, StoreError> {
    let store: Arc<dyn UsageStore> = match config.kind {
        StoreKind::Json => Arc::new(JsonFileStore::open(&config.path).await?),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&config.path).await?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(kind = store.kind(), path = %config.path, "Usage store opened");
    Ok(store)
}
