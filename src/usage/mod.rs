//! Usage accounting subsystem.
//!
//! # Data Flow
//! ```text
//! startup:
//!     store.load_all() → UsageRegistry::load (once, before serving)
//!
//! per forwarded request:
//!     relay finished
//!         → UsageRecorder::record(port)
//!         → UsageRegistry::increment (under the registry lock)
//!         → store.upsert_count (spawned, outside the lock)
//! ```
//!
//! # Design Decisions
//! - The registry is the system of record; the store may lag behind it
//! - Unknown destinations are forwarded but never auto-registered
//! - Persistence failures are logged and absorbed

pub mod record;
pub mod recorder;
pub mod registry;

pub use record::DestinationRecord;
pub use recorder::UsageRecorder;
pub use registry::UsageRegistry;
