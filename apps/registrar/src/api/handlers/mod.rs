//! Route handlers, one module per area.

pub mod assessments;
pub mod catalog;
pub mod directory;
pub mod interchange;
pub mod schedule;

use axum::Json;
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok".
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
