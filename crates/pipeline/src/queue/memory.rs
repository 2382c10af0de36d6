use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use relume_core::stage::Stage;

use super::{JobKey, JobQueue, JobStatus};
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    InFlight,
    Published,
    Failed,
    Abandoned,
}

/// In-process backend for tests and single-process deployments.
///
/// Holds no artifacts, so the consumer's `published` flag stands in for the
/// output file: a job acknowledged with an artifact polls as
/// [`JobStatus::Done`], one acknowledged without polls as
/// [`JobStatus::Vanished`], exactly as [`super::MarkerQueue`] would observe
/// on disk.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<HashMap<JobKey, Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobKey, Entry>> {
        // A poisoned map is still structurally valid: every mutation is a
        // single insert.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn submit(&self, stage: Stage, target: &str) -> Result<JobKey, QueueError> {
        relume_core::upload::validate_artifact_name(target)
            .map_err(|e| QueueError::InvalidTarget(e.to_string()))?;

        let key = JobKey::new(stage, target);
        let mut jobs = self.jobs();
        if jobs.get(&key) == Some(&Entry::InFlight) {
            return Err(QueueError::Duplicate(key));
        }
        jobs.insert(key.clone(), Entry::InFlight);
        Ok(key)
    }

    async fn poll(&self, key: &JobKey) -> Result<JobStatus, QueueError> {
        Ok(match self.jobs().get(key) {
            Some(Entry::InFlight) => JobStatus::Pending,
            Some(Entry::Published) => JobStatus::Done,
            Some(Entry::Failed | Entry::Abandoned) | None => JobStatus::Vanished,
        })
    }

    async fn abandon(&self, key: &JobKey) -> Result<bool, QueueError> {
        Ok(transition(&mut self.jobs(), key, Entry::Abandoned))
    }

    async fn pending(&self, stage: Stage) -> Result<Vec<JobKey>, QueueError> {
        let mut keys: Vec<JobKey> = self
            .jobs()
            .iter()
            .filter(|(key, entry)| key.stage == stage && **entry == Entry::InFlight)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn acknowledge(&self, key: &JobKey, published: bool) -> Result<bool, QueueError> {
        let next = if published { Entry::Published } else { Entry::Failed };
        Ok(transition(&mut self.jobs(), key, next))
    }
}

/// Move an in-flight job to `next`. Returns whether it was in flight.
fn transition(jobs: &mut HashMap<JobKey, Entry>, key: &JobKey, next: Entry) -> bool {
    match jobs.get_mut(key) {
        Some(entry) if *entry == Entry::InFlight => {
            *entry = next;
            true
        }
        _ => false,
    }
}
