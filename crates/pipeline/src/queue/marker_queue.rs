use async_trait::async_trait;
use relume_core::layout::StorageLayout;
use relume_core::stage::Stage;

use super::{JobKey, JobQueue, JobStatus};
use crate::error::QueueError;
use crate::marker;

/// Filesystem backend: one marker file per in-flight job.
///
/// Interoperates with any process that follows the same marker naming and
/// directory layout; no state is held in memory.
#[derive(Debug, Clone)]
pub struct MarkerQueue {
    layout: StorageLayout,
}

impl MarkerQueue {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn handle(&self, key: &JobKey) -> marker::MarkerHandle {
        marker::MarkerHandle::for_key(self.layout.marker_dir(key.stage), key)
    }

    async fn exists(path: &std::path::Path) -> Result<bool, QueueError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| QueueError::io(path, e))
    }
}

#[async_trait]
impl JobQueue for MarkerQueue {
    async fn submit(&self, stage: Stage, target: &str) -> Result<JobKey, QueueError> {
        let handle = marker::create_marker(self.layout.marker_dir(stage), target, stage).await?;
        Ok(handle.key())
    }

    async fn poll(&self, key: &JobKey) -> Result<JobStatus, QueueError> {
        // Output first: a worker publishes the artifact before removing the
        // marker, so this order can only under-report completion.
        let output_exists = Self::exists(&self.layout.output_path(key.stage, &key.target)).await?;
        let marker_exists = Self::exists(&self.layout.marker_path(key.stage, &key.target)).await?;
        Ok(JobStatus::from_observation(marker_exists, output_exists))
    }

    async fn abandon(&self, key: &JobKey) -> Result<bool, QueueError> {
        marker::delete_marker(&self.handle(key)).await
    }

    async fn pending(&self, stage: Stage) -> Result<Vec<JobKey>, QueueError> {
        let markers = marker::list_pending_markers(self.layout.marker_dir(stage), stage).await?;
        for handle in &markers {
            // The marker may be consumed between listing and this lookup.
            if let Ok(created_at) = handle.created_at().await {
                tracing::trace!(job = %handle.key(), %created_at, "Pending marker");
            }
        }
        Ok(markers.iter().map(marker::MarkerHandle::key).collect())
    }

    /// The output file on disk is the record of publication, so `published`
    /// is not stored.
    async fn acknowledge(&self, key: &JobKey, _published: bool) -> Result<bool, QueueError> {
        marker::delete_marker(&self.handle(key)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
