//! Upload filename sanitization and validation.
//!
//! Uploaded names become paths on a shared filesystem and marker names, so
//! they are reduced to a safe basename before anything touches disk.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Image extensions accepted for upload (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

/// Reduce a client-supplied filename to a safe basename.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_` and leading dots are removed so the result can never be a
/// hidden file or a temporary artifact name. Returns `None` when nothing
/// usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let basename = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let replaced = UNSAFE_CHARS_RE.replace_all(basename.trim(), "_");
    let cleaned = replaced.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Whether `filename` carries one of [`ALLOWED_EXTENSIONS`].
pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sanitize and validate an uploaded filename in one step.
pub fn validate_upload_name(raw: &str) -> Result<String, CoreError> {
    let name = sanitize_filename(raw)
        .ok_or_else(|| CoreError::Validation("Uploaded file has no usable name".into()))?;

    if !has_allowed_extension(&name) {
        return Err(CoreError::Validation(format!(
            "File type not allowed for '{name}'. Must be one of: {ALLOWED_EXTENSIONS:?}"
        )));
    }

    Ok(name)
}

/// Validate a filename received back from a client (path parameter or
/// form field) before it is joined onto a storage directory.
///
/// Unlike [`sanitize_filename`] this does not rewrite anything: a name that
/// is not already a plain basename is rejected.
pub fn validate_artifact_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("Filename must not be empty".into()));
    }
    if name.starts_with('.') {
        return Err(CoreError::Validation(format!(
            "Filename '{name}' must not start with '.'"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(CoreError::Validation(format!(
            "Filename '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
