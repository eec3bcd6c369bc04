//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open store → load_all → seed registry → bind listeners → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain in-flight relays → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, then listeners
//! - A store that cannot be loaded stops the process before it serves

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, run, serve, Ready, StartupError};
