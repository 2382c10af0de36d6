//! Handlers for the restoration flow: upload, then optional stage two.
//!
//! Both POST handlers block until their stage finishes (or its wait budget
//! runs out). The stage-1 artifact name rendered into the result page is
//! the only state carried between the two requests.

use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use relume_core::naming;
use relume_core::upload::validate_upload_name;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::pages;
use crate::state::AppState;

/// Multipart field carrying the uploaded image.
const UPLOAD_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /apply-stage2`.
#[derive(Debug, Deserialize)]
pub struct Stage2Request {
    /// Stage-1 artifact to restore. Older clients send `esrgan_filename`.
    #[serde(alias = "esrgan_filename")]
    pub stage1_filename: Option<String>,
}

/// Extractor accepting either a JSON body or a url-encoded form.
///
/// The result page posts a form; scripted clients send JSON.
pub struct JsonOrForm<T>(pub T);

impl<T, S> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /
pub async fn index() -> Html<String> {
    Html(pages::index_page())
}

/// POST /upload
///
/// Save the uploaded image to the inputs directory and run super-resolution
/// on it. A request without a usable image is redirected back to the form.
/// An upload whose name is still being processed is rejected with 409 and
/// not written. If the stage times out the original is served as the
/// stage-1 artifact.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Response> {
    let Some((raw_name, bytes)) = read_upload(&mut multipart).await? else {
        tracing::debug!("Upload without a file, redirecting to form");
        return Ok(Redirect::to("/").into_response());
    };

    let filename = match validate_upload_name(&raw_name) {
        Ok(name) => name,
        Err(e) => {
            tracing::info!(raw_name, error = %e, "Rejected upload");
            return Ok(Redirect::to("/").into_response());
        }
    };

    let result = state.orchestrator.enhance_upload(&filename, &bytes).await?;
    Ok(Html(pages::stage1_page(&filename, &result.output, result.fell_back)).into_response())
}

/// POST /apply-stage2
///
/// Run face restoration on a stage-1 artifact named by the client and
/// render all three images.
pub async fn apply_stage2(
    State(state): State<AppState>,
    JsonOrForm(input): JsonOrForm<Stage2Request>,
) -> AppResult<Html<String>> {
    let stage1 = input
        .stage1_filename
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("No stage-1 filename provided".into()))?;

    let stage2 = state.orchestrator.restore_faces(&stage1).await?;
    let original = naming::original_name(&stage1);
    Ok(Html(pages::final_page(original, &stage1, &stage2)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the `file` field. Returns `None` when the field is absent, has no
/// filename, or is empty. Other fields are skipped.
async fn read_upload(multipart: &mut Multipart) -> AppResult<Option<(String, axum::body::Bytes)>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;

        if filename.is_empty() || data.is_empty() {
            return Ok(None);
        }
        return Ok(Some((filename, data)));
    }
    Ok(None)
}

/// A body over the upload limit is 413; any other malformed multipart is 400.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
