use std::path::Path;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether uploads can be saved.
    pub inputs_writable: bool,
    /// Whether artifacts and stage-2 markers can be written.
    pub outputs_writable: bool,
}

/// GET /health -- returns service and storage health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let layout = state.orchestrator.layout();
    let inputs_writable = is_writable_dir(&layout.inputs_dir).await;
    let outputs_writable = is_writable_dir(&layout.outputs_dir).await;

    let status = if inputs_writable && outputs_writable {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        inputs_writable,
        outputs_writable,
    })
}

async fn is_writable_dir(dir: &Path) -> bool {
    match tokio::fs::metadata(dir).await {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
