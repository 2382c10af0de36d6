//! Job marker primitives.
//!
//! A marker is a small sentinel file named `{target}.{stage_suffix}` in the
//! directory its stage worker watches. Its presence means the job is
//! waiting or running; only existence matters, the content is a fixed
//! literal per stage. Markers are created exclusively: a second marker for
//! the same target and stage is rejected instead of silently overwriting
//! the one in flight.

use std::io;
use std::path::{Path, PathBuf};

use relume_core::naming;
use relume_core::stage::Stage;
use relume_core::types::Timestamp;
use relume_core::upload::validate_artifact_name;
use tokio::io::AsyncWriteExt;

use crate::error::QueueError;
use crate::queue::JobKey;

/// A marker file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHandle {
    pub path: PathBuf,
    /// The input filename this marker requests work for.
    pub target: String,
    pub stage: Stage,
}

impl MarkerHandle {
    /// Handle for `key`'s marker inside `dir`, whether or not it exists.
    pub fn for_key(dir: &Path, key: &JobKey) -> Self {
        Self {
            path: marker_path(dir, &key.target, key.stage),
            target: key.target.clone(),
            stage: key.stage,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.stage, self.target.clone())
    }

    /// When the marker was created (its modification time).
    pub async fn created_at(&self) -> Result<Timestamp, QueueError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| QueueError::io(&self.path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| QueueError::io(&self.path, e))?;
        Ok(Timestamp::from(modified))
    }
}

/// Deterministic marker location for `target` at `stage` inside `dir`.
pub fn marker_path(dir: &Path, target: &str, stage: Stage) -> PathBuf {
    dir.join(naming::marker_name(target, stage))
}

/// Create the marker for `target`, failing with [`QueueError::Duplicate`]
/// if one already exists.
pub async fn create_marker(dir: &Path, target: &str, stage: Stage) -> Result<MarkerHandle, QueueError> {
    validate_artifact_name(target).map_err(|e| QueueError::InvalidTarget(e.to_string()))?;

    let path = marker_path(dir, target, stage);
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(QueueError::Duplicate(JobKey::new(stage, target)));
        }
        Err(e) => return Err(QueueError::io(&path, e)),
    };

    let written = async {
        file.write_all(stage.marker_content().as_bytes()).await?;
        file.flush().await
    }
    .await;
    drop(file);
    keep_or_remove(&path, written).await?;

    tracing::debug!(%stage, target, path = %path.display(), "Marker created");

    Ok(MarkerHandle {
        path,
        target: target.to_string(),
        stage,
    })
}

/// Every marker for `stage` currently in `dir`, sorted by target name.
pub async fn list_pending_markers(dir: &Path, stage: Stage) -> Result<Vec<MarkerHandle>, QueueError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| QueueError::io(dir, e))?;

    let mut markers = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| QueueError::io(dir, e))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(target) = naming::marker_target(name, stage) else {
            continue;
        };
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        markers.push(MarkerHandle {
            path: entry.path(),
            target: target.to_string(),
            stage,
        });
    }

    markers.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(markers)
}

/// Remove a marker. Returns `false` if it was already gone.
pub async fn delete_marker(handle: &MarkerHandle) -> Result<bool, QueueError> {
    remove_if_present(&handle.path).await
}

/// A marker whose content could not be written is removed again, so the
/// target is not left blocked by a job nobody submitted.
async fn keep_or_remove(path: &Path, written: io::Result<()>) -> Result<(), QueueError> {
    let Err(e) = written else {
        return Ok(());
    };
    if let Err(cleanup) = remove_if_present(path).await {
        tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove half-written marker");
    }
    Err(QueueError::io(path, e))
}

async fn remove_if_present(path: &Path) -> Result<bool, QueueError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(QueueError::io(path, e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
