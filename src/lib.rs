//! Usage-counting reverse proxy.
//!
//! Routes `/{port}/...` to `http://localhost:{port}/...` and keeps a
//! per-port request count that is persisted to a durable store.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ http::request ──▶ hyper client ──▶ localhost:<port>
//!                                                                        │
//!     Client ◀── http::response::RelayBody ◀─────────────────────────────┘
//!                        │ relay finished
//!                        ▼
//!                usage::UsageRecorder ──▶ usage::UsageRegistry (lock, +1)
//!                        │
//!                        └──(spawned)──▶ store::UsageStore::upsert_count
//! ```

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod store;
pub mod usage;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use store::UsageStore;
pub use usage::{DestinationRecord, UsageRecorder, UsageRegistry};
