//! Stage dispatch and wait, as driven by the web service.
//!
//! The orchestrator is memoryless across requests: each call submits one
//! job, waits for it, and returns the artifact's filename, which the client
//! hands back to continue with the next stage.

use std::sync::Arc;
use std::time::Duration;

use relume_core::error::CoreError;
use relume_core::layout::StorageLayout;
use relume_core::naming;
use relume_core::stage::Stage;
use relume_core::upload::validate_artifact_name;
use tokio::sync::Mutex;

use crate::artifact;
use crate::error::{PipelineError, QueueError};
use crate::queue::{await_job, JobKey, JobOutcome, JobQueue, JobStatus, WaitPolicy};

/// Wait policy per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePolicies {
    pub super_resolution: WaitPolicy,
    pub face_restoration: WaitPolicy,
}

impl StagePolicies {
    pub fn for_stage(&self, stage: Stage) -> WaitPolicy {
        match stage {
            Stage::SuperResolution => self.super_resolution,
            Stage::FaceRestoration => self.face_restoration,
        }
    }
}

/// Result of one stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRun {
    /// The artifact `output` is on disk and the job is finished.
    Completed { output: String, waited: Duration },
    /// The stage did not finish in time and its marker was removed.
    /// `output` is where the artifact would have been written.
    TimedOut { output: String, waited: Duration },
}

/// Outcome of the super-resolution step of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage1Result {
    pub output: String,
    /// True when the stage timed out and the original upload was copied in
    /// place of the enhanced image.
    pub fell_back: bool,
}

/// Submits stage jobs and blocks the calling task until they finish.
pub struct Orchestrator {
    layout: StorageLayout,
    queue: Arc<dyn JobQueue>,
    policies: StagePolicies,
    /// Serialises the in-flight check, input rename and submit of uploads.
    staging: Mutex<()>,
}

impl Orchestrator {
    pub fn new(layout: StorageLayout, queue: Arc<dyn JobQueue>, policies: StagePolicies) -> Self {
        Self {
            layout,
            queue,
            policies,
            staging: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run `stage` on `input` and wait for it.
    ///
    /// Fails fast, without creating a marker, when the input artifact is
    /// missing. A timeout is not an error here; callers decide whether a
    /// substitute exists.
    pub async fn run_stage(&self, stage: Stage, input: &str) -> Result<StageRun, PipelineError> {
        self.check_preconditions(stage, input).await?;
        let key = self.queue.submit(stage, input).await?;
        tracing::info!(%stage, input, output = %key.output_name(), "Stage submitted");
        self.wait_stage(&key).await
    }

    async fn wait_stage(&self, key: &JobKey) -> Result<StageRun, PipelineError> {
        let stage = key.stage;
        let output = key.output_name();
        let outcome = await_job(self.queue.as_ref(), key, self.policies.for_stage(stage)).await?;
        Ok(match outcome {
            JobOutcome::Completed { waited } => {
                tracing::info!(%stage, output = %output, waited_ms = waited.as_millis() as u64, "Stage completed");
                StageRun::Completed { output, waited }
            }
            JobOutcome::TimedOut { waited, .. } => StageRun::TimedOut { output, waited },
        })
    }

    /// Store an uploaded file as `filename` and super-resolve it.
    ///
    /// A duplicate of an upload still in flight is rejected before its bytes
    /// reach the inputs directory. On timeout the original upload is copied
    /// as the stage-1 artifact so the caller always has something to show
    /// and download.
    pub async fn enhance_upload(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Stage1Result, PipelineError> {
        let key = self.stage_upload(filename, bytes).await?;
        tracing::info!(input = filename, output = %key.output_name(), "Upload submitted");

        match self.wait_stage(&key).await? {
            StageRun::Completed { output, .. } => Ok(Stage1Result {
                output,
                fell_back: false,
            }),
            StageRun::TimedOut { output, waited } => {
                tracing::warn!(
                    filename,
                    waited_ms = waited.as_millis() as u64,
                    "Super-resolution timed out, serving original upload",
                );
                let src = self.layout.input_path(Stage::SuperResolution, filename);
                let dest = self.layout.output_dir(Stage::SuperResolution).join(&output);
                artifact::copy_atomic(&src, &dest)
                    .await
                    .map_err(|source| PipelineError::Io { path: dest, source })?;
                Ok(Stage1Result {
                    output,
                    fell_back: true,
                })
            }
        }
    }

    /// Face-restore a stage-1 artifact. A timeout is surfaced as
    /// [`PipelineError::StageTimeout`]; there is no substitute artifact.
    pub async fn restore_faces(&self, stage1_filename: &str) -> Result<String, PipelineError> {
        match self.run_stage(Stage::FaceRestoration, stage1_filename).await? {
            StageRun::Completed { output, .. } => Ok(output),
            StageRun::TimedOut { waited, .. } => Err(PipelineError::StageTimeout {
                stage: Stage::FaceRestoration,
                input: stage1_filename.to_string(),
                waited,
            }),
        }
    }

    /// Write the upload beside its final name, then move it into place and
    /// submit only if no job for the same name is in flight.
    async fn stage_upload(&self, filename: &str, bytes: &[u8]) -> Result<JobKey, PipelineError> {
        validate_artifact_name(filename)?;
        let dest = self.layout.input_path(Stage::SuperResolution, filename);
        let temp = artifact::write_temp(&dest, bytes)
            .await
            .map_err(|source| PipelineError::Io {
                path: dest.clone(),
                source,
            })?;

        let _staging = self.staging.lock().await;
        let key = JobKey::new(Stage::SuperResolution, filename);
        let claimed: Result<(), PipelineError> = match self.queue.poll(&key).await {
            Ok(JobStatus::Pending | JobStatus::Writing) => Err(QueueError::Duplicate(key).into()),
            Ok(_) => artifact::publish(&temp, &dest)
                .await
                .map_err(|source| PipelineError::Io {
                    path: dest.clone(),
                    source,
                }),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = claimed {
            artifact::discard(&temp).await;
            return Err(e);
        }
        tracing::info!(filename, size = bytes.len(), "Upload saved");

        Ok(self.queue.submit(Stage::SuperResolution, filename).await?)
    }

    async fn check_preconditions(&self, stage: Stage, input: &str) -> Result<(), PipelineError> {
        validate_artifact_name(input)?;

        if stage == Stage::FaceRestoration && naming::is_stage2_artifact(input) {
            return Err(CoreError::Validation(format!(
                "'{input}' is already face-restored"
            ))
            .into());
        }

        let path = self.layout.input_path(stage, input);
        let present = artifact::exists(&path)
            .await
            .map_err(|source| PipelineError::Io {
                path: path.clone(),
                source,
            })?;
        if !present {
            tracing::error!(%stage, path = %path.display(), "Stage input missing, not submitting");
            return Err(PipelineError::MissingInput { stage, path });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
