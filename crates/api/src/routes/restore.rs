use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use relume_core::layout::StorageLayout;
use relume_core::naming;
use tower_http::services::ServeDir;

use crate::handlers::{download, restore};
use crate::state::AppState;

/// Routes for the restoration flow.
///
/// ```text
/// GET   /                          upload form
/// POST  /upload                    save upload, run super-resolution
/// POST  /apply-stage2              run face restoration on a stage-1 artifact
/// GET   /download/{filename}       artifact as attachment
/// GET   /static/inputs/{filename}  raw upload
/// GET   /static/outputs/{filename} raw artifact
/// ```
pub fn router(layout: &StorageLayout) -> Router<AppState> {
    let files = Router::new()
        .nest_service("/static/inputs", ServeDir::new(&layout.inputs_dir))
        .nest_service("/static/outputs", ServeDir::new(&layout.outputs_dir))
        .layer(middleware::from_fn(hide_internal_files));

    Router::new()
        .route("/", get(restore::index))
        .route("/upload", post(restore::upload))
        .route("/apply-stage2", post(restore::apply_stage2))
        .route("/download/{filename}", get(download::download))
        .merge(files)
}

/// Markers and in-progress artifacts share the served directories; they
/// answer 404 as if absent. Stored names never contain `%`, so an encoded
/// name is refused rather than decoded.
async fn hide_internal_files(request: Request, next: Next) -> Response {
    let name = request.uri().path().rsplit('/').next().unwrap_or_default();
    if name.contains('%') || naming::is_internal_file(name) {
        tracing::debug!(path = %request.uri().path(), "Refusing to serve internal file");
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}
