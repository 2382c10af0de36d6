//! Job queue abstraction.
//!
//! The orchestrator and the stage workers are written against [`JobQueue`]
//! rather than against marker files directly. [`MarkerQueue`] is the
//! filesystem backend that speaks the on-disk marker protocol;
//! [`MemoryQueue`] keeps the same semantics in process for tests.

mod marker_queue;
mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use relume_core::naming;
use relume_core::stage::{Stage, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use tokio::time::Instant;

use crate::error::QueueError;

pub use marker_queue::MarkerQueue;
pub use memory::MemoryQueue;

// ---------------------------------------------------------------------------
// Job identity and status
// ---------------------------------------------------------------------------

/// Identity of a unit of work: one stage applied to one input file.
///
/// At most one job per key may be in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub stage: Stage,
    /// Input filename, relative to the stage's input directory.
    pub target: String,
}

impl JobKey {
    pub fn new(stage: Stage, target: impl Into<String>) -> Self {
        Self {
            stage,
            target: target.into(),
        }
    }

    /// Filename of the artifact this job produces.
    pub fn output_name(&self) -> String {
        naming::output_name(self.stage, &self.target)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&naming::marker_name(&self.target, self.stage))
    }
}

/// Observed state of a job.
///
/// Completion is the conjunction "output exists and marker is gone"; the
/// worker removes the marker as its last step, so neither condition alone
/// is safe to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Marker present, no output yet.
    Pending,
    /// Output present but the marker has not been removed yet.
    Writing,
    /// Neither marker nor output: abandoned, or the worker gave up.
    Vanished,
    /// Output present and marker gone.
    Done,
}

impl JobStatus {
    pub fn from_observation(marker_exists: bool, output_exists: bool) -> Self {
        match (marker_exists, output_exists) {
            (true, false) => Self::Pending,
            (true, true) => Self::Writing,
            (false, false) => Self::Vanished,
            (false, true) => Self::Done,
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

// ---------------------------------------------------------------------------
// Queue trait
// ---------------------------------------------------------------------------

/// Producer and consumer operations shared by every backend.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Request `stage` on `target`. Rejects a key that is already in flight
    /// with [`QueueError::Duplicate`].
    async fn submit(&self, stage: Stage, target: &str) -> Result<JobKey, QueueError>;

    /// Current status of `key`.
    async fn poll(&self, key: &JobKey) -> Result<JobStatus, QueueError>;

    /// Stop tracking `key` from the producer side. A worker already running
    /// it is not interrupted. Returns whether anything was in flight.
    async fn abandon(&self, key: &JobKey) -> Result<bool, QueueError>;

    /// Jobs waiting for `stage`, in a stable order.
    async fn pending(&self, stage: Stage) -> Result<Vec<JobKey>, QueueError>;

    /// Consumer's final step. `published` says whether the output artifact
    /// was written; a job acknowledged without one never reports
    /// [`JobStatus::Done`]. Returns whether the job was still in flight.
    async fn acknowledge(&self, key: &JobKey, published: bool) -> Result<bool, QueueError>;
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// How long and how often a producer checks for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of waiting on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { waited: Duration },
    /// The wait budget ran out and the job was abandoned.
    TimedOut {
        waited: Duration,
        /// Whether abandoning removed a job still in flight.
        abandoned: bool,
    },
}

/// Poll `key` until it is done or `policy.max_wait` elapses.
///
/// Returns no later than `max_wait + poll_interval` (plus the cost of one
/// poll). On timeout the job is abandoned so nothing is left in flight.
pub async fn await_job(
    queue: &dyn JobQueue,
    key: &JobKey,
    policy: WaitPolicy,
) -> Result<JobOutcome, QueueError> {
    let started = Instant::now();
    let deadline = started + policy.max_wait;
    let mut last_status = None;

    loop {
        let status = queue.poll(key).await?;
        if status.is_done() {
            let waited = started.elapsed();
            tracing::debug!(job = %key, waited_ms = waited.as_millis() as u64, "Job completed");
            return Ok(JobOutcome::Completed { waited });
        }

        if last_status != Some(status) {
            tracing::debug!(job = %key, ?status, "Waiting for job");
            last_status = Some(status);
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
    }

    let abandoned = queue.abandon(key).await?;
    let waited = started.elapsed();
    tracing::warn!(
        job = %key,
        waited_ms = waited.as_millis() as u64,
        abandoned,
        "Job timed out",
    );
    Ok(JobOutcome::TimedOut { waited, abandoned })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
