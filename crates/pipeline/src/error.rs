use std::path::PathBuf;
use std::time::Duration;

use relume_core::error::CoreError;
use relume_core::stage::Stage;

use crate::queue::JobKey;

/// Errors raised by the job queue backends and the marker primitives.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A job for the same target and stage is already in flight.
    #[error("Job {0} is already in flight")]
    Duplicate(JobKey),

    /// The target filename cannot be used as a marker name.
    #[error("Invalid job target: {0}")]
    InvalidTarget(String),

    /// Filesystem access to a marker or artifact failed.
    #[error("Queue I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by the orchestrator to its callers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The stage's input artifact is not on disk, so no marker was created.
    #[error("{stage} input not found: {}", path.display())]
    MissingInput { stage: Stage, path: PathBuf },

    /// The stage did not finish within its wait budget and was abandoned.
    #[error("{stage} for '{input}' did not finish within {}s", waited.as_secs())]
    StageTimeout {
        stage: Stage,
        input: String,
        waited: Duration,
    },

    /// Writing a fallback artifact failed.
    #[error("Artifact I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
