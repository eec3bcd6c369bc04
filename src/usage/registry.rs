//! In-memory usage registry.
//!
//! # Responsibilities
//! - Hold the live request count for every known destination
//! - Serialize all reads and increments through one lock
//!
//! # Design Decisions
//! - The lock covers only the map lookup and the mutation; callers forward
//!   and persist after the guard is released
//! - `increment` is the only path that changes a count

use std::collections::HashMap;
use std::sync::Mutex;

use crate::usage::record::DestinationRecord;

/// Registry of destination records keyed by port.
#[derive(Debug, Default)]
pub struct UsageRegistry {
    records: Mutex<HashMap<u32, DestinationRecord>>,
}

impl UsageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry already seeded with `records`.
    pub fn with_records(records: impl IntoIterator<Item = DestinationRecord>) -> Self {
        let registry = Self::new();
        registry.load(records);
        registry
    }

    /// Replace the registry contents with `records`.
    ///
    /// Meant to run once before traffic is served. When the input repeats an
    /// identifier the highest count is kept.
    pub fn load(&self, records: impl IntoIterator<Item = DestinationRecord>) {
        let mut fresh: HashMap<u32, DestinationRecord> = HashMap::new();
        for record in records {
            fresh
                .entry(record.identifier)
                .and_modify(|existing| existing.count = existing.count.max(record.count))
                .or_insert(record);
        }

        let mut guard = self.records.lock().expect("usage registry mutex poisoned");
        *guard = fresh;
    }

    /// Current record for `identifier`, if one is registered.
    pub fn get(&self, identifier: u32) -> Option<DestinationRecord> {
        let guard = self.records.lock().expect("usage registry mutex poisoned");
        guard.get(&identifier).copied()
    }

    /// Increase the count for `identifier` by one and return the new value.
    ///
    /// Returns `None` when the destination is not registered; no record is
    /// created in that case.
    pub fn increment(&self, identifier: u32) -> Option<u64> {
        let mut guard = self.records.lock().expect("usage registry mutex poisoned");
        let record = guard.get_mut(&identifier)?;
        record.count = record.count.saturating_add(1);
        Some(record.count)
    }

    /// Copy of every record, ordered by identifier.
    pub fn snapshot(&self) -> Vec<DestinationRecord> {
        let mut records: Vec<DestinationRecord> = {
            let guard = self.records.lock().expect("usage registry mutex poisoned");
            guard.values().copied().collect()
        };
        records.sort_by_key(|r| r.identifier);
        records
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.records.lock().expect("usage registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
