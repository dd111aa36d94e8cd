//! Status endpoint handlers

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::types::StatusReport;
use crate::watchdog::SharedStatus;

/// Liveness of the watchdog process itself
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /status - last snapshot published by the loop
pub async fn get_status(State(status): State<SharedStatus>) -> Json<StatusReport> {
    Json(status.read().await.clone())
}
