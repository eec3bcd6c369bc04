use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::usage::DestinationRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub store: String,
    pub tracked_destinations: usize,
    pub total_requests: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let records = state.registry.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        store: state.store_kind.to_string(),
        tracked_destinations: records.len(),
        total_requests: records.iter().map(|r| r.count).sum(),
    })
}

pub async fn get_usage(State(state): State<AdminState>) -> Json<Vec<DestinationRecord>> {
    Json(state.registry.snapshot())
}

pub async fn get_usage_for(
    State(state): State<AdminState>,
    Path(port): Path<u32>,
) -> Result<Json<DestinationRecord>, (StatusCode, String)> {
    state
        .registry
        .get(port)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No usage record for port {}", port)))
}
