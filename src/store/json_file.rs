//! JSON document store.
//!
//! Keeps every destination as a `{ "port": .., "count": .. }` document in a
//! single JSON array on disk. The whole file is rewritten on each change,
//! which suits the handful of destinations a single host runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{StoreError, UsageStore};
use crate::usage::DestinationRecord;

/// File-backed store holding a JSON array of destination records.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Mirror of the file contents. The async lock also serializes writers.
    counts: Mutex<HashMap<u32, u64>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let counts = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => {
                let records: Vec<DestinationRecord> = serde_json::from_slice(&bytes)?;
                let mut counts = HashMap::with_capacity(records.len());
                for record in records {
                    let stored = counts.entry(record.identifier).or_insert(record.count);
                    *stored = (*stored).max(record.count);
                }
                counts
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Usage file not found, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            counts: Mutex::new(counts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, counts: &HashMap<u32, u64>) -> Result<(), StoreError> {
        let mut records: Vec<DestinationRecord> = counts
            .iter()
            .map(|(&identifier, &count)| DestinationRecord::new(identifier, count))
            .collect();
        records.sort_by_key(|r| r.identifier);

        let bytes = serde_json::to_vec_pretty(&records)?;

        // Write beside the target and rename so readers never see a torn file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError> {
        let counts = self.counts.lock().await;
        Ok(counts
            .iter()
            .map(|(&identifier, &count)| DestinationRecord::new(identifier, count))
            .collect())
    }

    async fn upsert_count(&self, identifier: u32, count: u64) -> Result<(), StoreError> {
        let mut counts = self.counts.lock().await;

        if let Some(&stored) = counts.get(&identifier) {
            if stored >= count {
                return Ok(());
            }
        }

        let previous = counts.insert(identifier, count);
        if let Err(e) = self.write_file(&counts).await {
            // Keep the mirror in step with what is on disk.
            match previous {
                Some(prev) => counts.insert(identifier, prev),
                None => counts.remove(&identifier),
            };
            return Err(e);
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "json"
    }
}
