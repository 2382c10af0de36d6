use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relume_core::error::CoreError;
use relume_pipeline::{PipelineError, QueueError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `relume_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stage dispatch or wait error from `relume_pipeline`.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured upload limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Pipeline errors ---
            AppError::Pipeline(err) => classify_pipeline_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map a pipeline error to an HTTP status, error code, and message.
///
/// - A missing stage input maps to 404; filesystem paths are not echoed.
/// - A job already in flight maps to 409.
/// - A stage that never finished maps to 500 `STAGE_TIMEOUT` with guidance.
/// - I/O failures map to 500 with a sanitized message.
fn classify_pipeline_error(err: &PipelineError) -> Classified {
    match err {
        PipelineError::Core(core) => classify_core_error(core),
        PipelineError::Queue(QueueError::Duplicate(key)) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!(
                "{} of '{}' is already in progress",
                key.stage.label(),
                key.target
            ),
        ),
        PipelineError::Queue(QueueError::InvalidTarget(msg)) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        PipelineError::Queue(err @ QueueError::Io { .. }) => {
            tracing::error!(error = %err, "Queue I/O error");
            internal()
        }
        PipelineError::MissingInput { stage, path } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} input not found: {name}", stage.label()),
            )
        }
        PipelineError::StageTimeout { stage, input, waited } => {
            tracing::warn!(%stage, input, waited_secs = waited.as_secs(), "Stage timed out");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STAGE_TIMEOUT",
                format!(
                    "{} processing timed out or failed. The background processor may not be running.",
                    stage.label()
                ),
            )
        }
        PipelineError::Io { .. } => {
            tracing::error!(error = %err, "Artifact I/O error");
            internal()
        }
    }
}
