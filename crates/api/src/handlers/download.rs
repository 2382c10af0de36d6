//! Artifact download.

use std::io;
use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use relume_core::error::CoreError;
use relume_core::naming;
use relume_core::upload::validate_artifact_name;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Prefix of the filename suggested to the browser.
const DOWNLOAD_NAME_PREFIX: &str = "enhanced_";

/// GET /download/{filename}
///
/// Serve an artifact from the outputs directory as an attachment. The body
/// is the artifact's bytes unchanged.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    validate_artifact_name(&filename)?;
    if naming::is_internal_file(&filename) {
        return Err(CoreError::NotFound {
            entity: "Artifact",
            name: filename,
        }
        .into());
    }

    let path = state.orchestrator.layout().outputs_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CoreError::NotFound {
                entity: "Artifact",
                name: filename,
            }
            .into());
        }
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };

    tracing::debug!(filename, size = bytes.len(), "Serving download");

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type_for(&path).to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_NAME_PREFIX}{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// MIME type from the file extension.
fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
