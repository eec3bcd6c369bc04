//! Destination record model.

use serde::{Deserialize, Serialize};

/// Usage record for one backend application, keyed by the loopback port
/// it listens on.
///
/// Serialized as `{ "port": .., "count": .. }`, the document shape the
/// file-backed store keeps on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationRecord {
    /// TCP port of the backend on localhost.
    #[serde(rename = "port")]
    pub identifier: u32,

    /// Requests successfully routed to this destination since records began.
    pub count: u64,
}

impl DestinationRecord {
    pub fn new(identifier: u32, count: u64) -> Self {
        Self { identifier, count }
    }
}
