use std::sync::Arc;

use relume_pipeline::orchestrator::Orchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Stage dispatch and wait.
    pub orchestrator: Arc<Orchestrator>,
}
