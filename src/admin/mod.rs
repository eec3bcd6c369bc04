//! Read-only admin API.
//!
//! Serves usage counts on its own listener so the proxy route space stays
//! `/{port}` only. Nothing here mutates a count.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::handlers::*;
use crate::usage::UsageRegistry;

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<UsageRegistry>,
    pub store_kind: &'static str,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/usage", get(get_usage))
        .route("/admin/usage/{port}", get(get_usage_for))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn run_admin_server(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
