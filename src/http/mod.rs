//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing layer)
//!     → request.rs (port from path, loopback request)
//!     → hyper client → localhost:<port>
//!     → response.rs (relay body, count on finish)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::{ProxyError, RelayBody};
pub use server::{AppState, HttpServer};
