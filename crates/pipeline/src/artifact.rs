//! Artifact publication.
//!
//! Artifacts are written under a temporary name in their destination
//! directory and renamed into place, so a reader polling for the final name
//! never observes a partially written image. Temporary names keep the final
//! filename as their tail because image encoders pick the format from the
//! extension.

use std::io;
use std::path::{Path, PathBuf};

/// Prefix of in-progress artifact files. The leading dot keeps them out of
/// download and marker namespaces.
pub const TEMP_PREFIX: &str = ".partial-";

/// Temporary sibling path for `final_path`.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!("{TEMP_PREFIX}{}-{name}", uuid::Uuid::new_v4().simple());
    final_path.with_file_name(temp_name)
}

/// Move a fully written temporary file to its final name.
pub async fn publish(temp: &Path, final_path: &Path) -> io::Result<()> {
    tokio::fs::rename(temp, final_path).await
}

/// Remove a temporary file, ignoring one that was never created.
pub async fn discard(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %temp.display(), error = %e, "Failed to remove temporary artifact");
        }
    }
}

/// Write `bytes` to a temporary sibling of `dest` and return its path.
/// The caller decides whether to [`publish`] or [`discard`] it.
pub async fn write_temp(dest: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let temp = temp_path_for(dest);
    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        discard(&temp).await;
        return Err(e);
    }
    Ok(temp)
}

/// Copy `src` to `dest` atomically, byte for byte.
pub async fn copy_atomic(src: &Path, dest: &Path) -> io::Result<()> {
    let temp = temp_path_for(dest);
    if let Err(e) = tokio::fs::copy(src, &temp).await {
        discard(&temp).await;
        return Err(e);
    }
    finish(&temp, dest).await
}

/// Whether `path` exists. Permission errors are reported, not hidden.
pub async fn exists(path: &Path) -> io::Result<bool> {
    tokio::fs::try_exists(path).await
}

async fn finish(temp: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = publish(temp, dest).await {
        discard(temp).await;
        return Err(e);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
