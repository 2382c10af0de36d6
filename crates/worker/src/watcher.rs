//! Watcher loop for one stage.
//!
//! Each cycle scans for pending jobs, dispatches them one at a time, and
//! sleeps. Every dispatched job ends with an artifact when at all possible
//! (the enhancer's, or the fallback transform's) and always ends with its
//! job acknowledged, so a waiting producer is never stuck on a marker the
//! worker has already given up on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relume_core::layout::StorageLayout;
use relume_core::stage::{Stage, DEFAULT_POLL_INTERVAL};
use relume_pipeline::artifact;
use relume_pipeline::enhancer::{EnhanceJob, Enhancer, FallbackTransform, InferenceError, DEFAULT_UPSCALE};
use relume_pipeline::queue::{JobKey, JobQueue};
use relume_pipeline::QueueError;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_ERROR_BACKOFF;

/// Loop timing and inference limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Pause between scans.
    pub scan_interval: Duration,
    /// Pause after a scan fails.
    pub error_backoff: Duration,
    /// Wall-clock budget for one enhancer call.
    pub budget: Duration,
    /// Scale factor for the super-resolution fallback.
    pub upscale: u32,
}

impl WatcherSettings {
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            scan_interval: DEFAULT_POLL_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            budget: stage.default_budget(),
            upscale: DEFAULT_UPSCALE,
        }
    }
}

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The enhancer produced the artifact.
    Enhanced,
    /// The enhancer failed and the fallback transform produced the artifact.
    FellBack { reason: String },
    /// No artifact could be produced.
    Failed { reason: String },
}

impl StageOutcome {
    /// Whether the output artifact was written.
    pub fn published(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Sequential scheduler for one stage.
pub struct StageWatcher {
    stage: Stage,
    layout: StorageLayout,
    queue: Arc<dyn JobQueue>,
    enhancer: Arc<dyn Enhancer>,
    fallback: FallbackTransform,
    settings: WatcherSettings,
}

impl StageWatcher {
    pub fn new(
        stage: Stage,
        layout: StorageLayout,
        queue: Arc<dyn JobQueue>,
        enhancer: Arc<dyn Enhancer>,
        settings: WatcherSettings,
    ) -> Self {
        let fallback = FallbackTransform::for_kind(enhancer.kind(), settings.upscale);
        Self {
            stage,
            layout,
            queue,
            enhancer,
            fallback,
            settings,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Scan, dispatch and sleep until `cancel` fires.
    ///
    /// A job already being dispatched runs to completion before the loop
    /// exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            stage = %self.stage,
            enhancer = %self.enhancer.kind(),
            scan_interval_ms = self.settings.scan_interval.as_millis() as u64,
            budget_secs = self.settings.budget.as_secs(),
            "Stage watcher started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match self.scan_once(&cancel).await {
                Ok(_) => self.settings.scan_interval,
                Err(e) => {
                    tracing::error!(stage = %self.stage, error = %e, "Scan failed, backing off");
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(stage = %self.stage, "Stage watcher stopped");
    }

    /// One SCANNING pass: dispatch every pending job in order. Returns the
    /// number of jobs dispatched.
    pub async fn scan_once(&self, cancel: &CancellationToken) -> Result<usize, QueueError> {
        let pending = self.queue.pending(self.stage).await?;
        if !pending.is_empty() {
            tracing::debug!(stage = %self.stage, count = pending.len(), "Pending jobs found");
        }

        let mut dispatched = 0;
        for key in pending {
            if cancel.is_cancelled() {
                break;
            }
            self.dispatch(&key).await;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Process one job and acknowledge it, whatever happened.
    pub async fn dispatch(&self, key: &JobKey) -> StageOutcome {
        let started = Instant::now();
        tracing::info!(stage = %self.stage, target = %key.target, "Processing job");

        let outcome = self.attempt(key).await;

        match self.queue.acknowledge(key, outcome.published()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job = %key, "Job was abandoned before it finished");
            }
            Err(e) => {
                tracing::error!(job = %key, error = %e, "Failed to acknowledge job");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            StageOutcome::Enhanced => {
                tracing::info!(job = %key, output = %key.output_name(), duration_ms, "Job enhanced");
            }
            StageOutcome::FellBack { reason } => {
                tracing::warn!(job = %key, output = %key.output_name(), duration_ms, reason, "Job completed with fallback");
            }
            StageOutcome::Failed { reason } => {
                tracing::error!(job = %key, duration_ms, reason, "Job failed without output");
            }
        }
        outcome
    }

    async fn attempt(&self, key: &JobKey) -> StageOutcome {
        let input = self.layout.input_path(self.stage, &key.target);
        let output = self.layout.output_path(self.stage, &key.target);

        match artifact::exists(&input).await {
            Ok(true) => {}
            Ok(false) => {
                return StageOutcome::Failed {
                    reason: format!("input {} not found", input.display()),
                };
            }
            Err(e) => {
                return StageOutcome::Failed {
                    reason: format!("cannot access input {}: {e}", input.display()),
                };
            }
        }

        let temp = artifact::temp_path_for(&output);
        let job = EnhanceJob {
            input: input.clone(),
            output: temp.clone(),
        };

        let reason = match self.run_enhancer(job).await {
            Ok(()) => match artifact::publish(&temp, &output).await {
                Ok(()) => return StageOutcome::Enhanced,
                Err(e) => format!("publishing enhanced artifact failed: {e}"),
            },
            Err(e) => e.to_string(),
        };
        artifact::discard(&temp).await;

        tracing::warn!(job = %key, reason, fallback = ?self.fallback, "Enhancer failed, applying fallback");

        let temp = artifact::temp_path_for(&output);
        let fallback_result = match self.fallback.apply(&input, &temp).await {
            Ok(()) => artifact::publish(&temp, &output)
                .await
                .map_err(InferenceError::from),
            Err(e) => Err(e),
        };

        match fallback_result {
            Ok(()) => StageOutcome::FellBack { reason },
            Err(e) => {
                artifact::discard(&temp).await;
                StageOutcome::Failed {
                    reason: format!("{reason}; fallback failed: {e}"),
                }
            }
        }
    }

    /// Run the enhancer on its own task under the wall-clock budget. A
    /// panic or an overrun is reported as an error, and an overrunning
    /// task is aborted.
    async fn run_enhancer(&self, job: EnhanceJob) -> Result<(), InferenceError> {
        let enhancer = Arc::clone(&self.enhancer);
        let expected = job.output.clone();
        let mut handle = tokio::spawn(async move { enhancer.enhance(&job).await });

        match tokio::time::timeout(self.settings.budget, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                if artifact::exists(&expected).await? {
                    Ok(())
                } else {
                    Err(InferenceError::MissingOutput)
                }
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join_error)) => Err(InferenceError::Panicked(join_error.to_string())),
            Err(_elapsed) => {
                handle.abort();
                Err(InferenceError::Timeout {
                    budget: self.settings.budget,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use image::{GenericImageView, RgbImage};
    use relume_pipeline::enhancer::{EnhancerKind, ImageFnEnhancer};
    use relume_pipeline::orchestrator::{Orchestrator, StagePolicies};
    use relume_pipeline::queue::{JobStatus, MarkerQueue, MemoryQueue, WaitPolicy};

    use super::*;

    /// Test double with scripted behaviour.
    enum Script {
        Fail,
        Hang,
        Panic,
        SucceedWithoutOutput,
    }

    struct ScriptedEnhancer {
        kind: EnhancerKind,
        script: Script,
    }

    #[async_trait]
    impl Enhancer for ScriptedEnhancer {
        fn kind(&self) -> EnhancerKind {
            self.kind
        }

        async fn enhance(&self, _job: &EnhanceJob) -> Result<(), InferenceError> {
            match self.script {
                Script::Fail => Err(InferenceError::ExitStatus {
                    code: Some(1),
                    stderr: "CUDA out of memory".into(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                Script::Panic => panic!("model crashed"),
                Script::SucceedWithoutOutput => Ok(()),
            }
        }
    }

    /// Records the order in which jobs reach the enhancer.
    struct RecordingEnhancer {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Enhancer for RecordingEnhancer {
        fn kind(&self) -> EnhancerKind {
            EnhancerKind::FaceRestoration
        }

        async fn enhance(&self, job: &EnhanceJob) -> Result<(), InferenceError> {
            let name = job.input.file_name().unwrap().to_string_lossy().into_owned();
            self.seen.lock().unwrap().push(name);
            tokio::fs::copy(&job.input, &job.output).await?;
            Ok(())
        }
    }

    /// Writes fixed bytes after a delay.
    struct SlowEnhancer {
        delay: Duration,
        bytes: &'static [u8],
    }

    #[async_trait]
    impl Enhancer for SlowEnhancer {
        fn kind(&self) -> EnhancerKind {
            EnhancerKind::SuperResolution
        }

        async fn enhance(&self, job: &EnhanceJob) -> Result<(), InferenceError> {
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(&job.output, self.bytes).await?;
            Ok(())
        }
    }

    /// A queue whose every scan fails, counting the attempts.
    #[derive(Default)]
    struct BrokenQueue {
        scans: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn submit(&self, stage: Stage, target: &str) -> Result<JobKey, QueueError> {
            Ok(JobKey::new(stage, target))
        }

        async fn poll(&self, _key: &JobKey) -> Result<JobStatus, QueueError> {
            Ok(JobStatus::Vanished)
        }

        async fn abandon(&self, _key: &JobKey) -> Result<bool, QueueError> {
            Ok(false)
        }

        async fn pending(&self, _stage: Stage) -> Result<Vec<JobKey>, QueueError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::InvalidTarget("marker directory unreadable".into()))
        }

        async fn acknowledge(&self, _key: &JobKey, _published: bool) -> Result<bool, QueueError> {
            Ok(false)
        }
    }

    fn settings() -> WatcherSettings {
        WatcherSettings {
            scan_interval: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
            budget: Duration::from_secs(10),
            upscale: 4,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: StorageLayout,
        queue: Arc<MarkerQueue>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("inputs"), dir.path().join("outputs"));
        std::fs::create_dir_all(&layout.inputs_dir).unwrap();
        std::fs::create_dir_all(&layout.outputs_dir).unwrap();
        let queue = Arc::new(MarkerQueue::new(layout.clone()));
        Fixture {
            _dir: dir,
            layout,
            queue,
        }
    }

    fn scripted(kind: EnhancerKind, script: Script) -> Arc<dyn Enhancer> {
        Arc::new(ScriptedEnhancer { kind, script })
    }

    fn write_png(path: &std::path::Path, w: u32, h: u32) {
        RgbImage::from_pixel(w, h, image::Rgb([120, 80, 40])).save(path).unwrap();
    }

    fn dir_names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // -- Fallback ----------------------------------------------------------

    #[tokio::test]
    async fn failing_super_resolution_falls_back_to_resize() {
        let fx = fixture();
        write_png(&fx.layout.inputs_dir.join("a.png"), 3, 2);
        let key = fx.queue.submit(Stage::SuperResolution, "a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            settings(),
        );
        let outcome = watcher.dispatch(&key).await;

        assert_matches!(outcome, StageOutcome::FellBack { ref reason } if reason.contains("CUDA out of memory"));
        let out = image::open(fx.layout.outputs_dir.join("esrgan_a.png")).unwrap();
        assert_eq!(out.dimensions(), (12, 8));
        assert!(!fx.layout.inputs_dir.join("a.png.process_esrgan").exists());
        assert!(fx.queue.poll(&key).await.unwrap().is_done());
    }

    #[tokio::test]
    async fn failing_face_restoration_falls_back_to_copy() {
        let fx = fixture();
        let input = fx.layout.outputs_dir.join("esrgan_a.png");
        write_png(&input, 4, 4);
        let key = fx.queue.submit(Stage::FaceRestoration, "esrgan_a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::FaceRestoration,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::FaceRestoration, Script::Fail),
            settings(),
        );
        assert_matches!(watcher.dispatch(&key).await, StageOutcome::FellBack { .. });

        let output = fx.layout.outputs_dir.join("final_enhanced_a.png");
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
        assert_eq!(dir_names(&fx.layout.outputs_dir), vec!["esrgan_a.png", "final_enhanced_a.png"]);
    }

    #[tokio::test]
    async fn overrunning_enhancer_is_cut_off() {
        let fx = fixture();
        write_png(&fx.layout.outputs_dir.join("esrgan_a.png"), 2, 2);
        let key = fx.queue.submit(Stage::FaceRestoration, "esrgan_a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::FaceRestoration,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::FaceRestoration, Script::Hang),
            WatcherSettings {
                budget: Duration::from_millis(50),
                ..settings()
            },
        );

        let started = Instant::now();
        let outcome = watcher.dispatch(&key).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_matches!(outcome, StageOutcome::FellBack { ref reason } if reason.contains("budget"));
        assert!(fx.queue.poll(&key).await.unwrap().is_done());
    }

    #[tokio::test]
    async fn panicking_enhancer_still_produces_artifact() {
        let fx = fixture();
        write_png(&fx.layout.outputs_dir.join("esrgan_a.png"), 2, 2);
        let key = fx.queue.submit(Stage::FaceRestoration, "esrgan_a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::FaceRestoration,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::FaceRestoration, Script::Panic),
            settings(),
        );
        assert_matches!(watcher.dispatch(&key).await, StageOutcome::FellBack { .. });
        assert!(fx.queue.poll(&key).await.unwrap().is_done());
    }

    #[tokio::test]
    async fn success_without_output_falls_back() {
        let fx = fixture();
        write_png(&fx.layout.inputs_dir.join("a.png"), 1, 1);
        let key = fx.queue.submit(Stage::SuperResolution, "a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::SucceedWithoutOutput),
            settings(),
        );
        assert_matches!(
            watcher.dispatch(&key).await,
            StageOutcome::FellBack { ref reason } if reason.contains("no output")
        );
    }

    // -- Success and failure -----------------------------------------------

    #[tokio::test]
    async fn successful_enhancer_output_is_published() {
        let fx = fixture();
        write_png(&fx.layout.inputs_dir.join("a.png"), 2, 2);
        let key = fx.queue.submit(Stage::SuperResolution, "a.png").await.unwrap();

        let enhancer = ImageFnEnhancer::new(EnhancerKind::SuperResolution, |img| {
            Ok(img.resize_exact(8, 8, image::imageops::FilterType::Nearest))
        });
        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            Arc::new(enhancer),
            settings(),
        );

        assert_eq!(watcher.dispatch(&key).await, StageOutcome::Enhanced);
        let out = image::open(fx.layout.outputs_dir.join("esrgan_a.png")).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(dir_names(&fx.layout.outputs_dir), vec!["esrgan_a.png"]);
    }

    #[tokio::test]
    async fn failed_dispatch_is_never_done_on_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path(), dir.path());
        let queue = Arc::new(MemoryQueue::new());
        let key = queue.submit(Stage::SuperResolution, "gone.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            layout,
            queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            settings(),
        );
        assert_matches!(watcher.dispatch(&key).await, StageOutcome::Failed { .. });
        assert_eq!(queue.poll(&key).await.unwrap(), JobStatus::Vanished);
        assert!(queue.pending(Stage::SuperResolution).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_dispatch_is_never_done_on_marker_backend() {
        let fx = fixture();
        let key = fx.queue.submit(Stage::SuperResolution, "gone.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            settings(),
        );
        assert_matches!(watcher.dispatch(&key).await, StageOutcome::Failed { .. });
        assert_eq!(fx.queue.poll(&key).await.unwrap(), JobStatus::Vanished);
    }

    #[tokio::test]
    async fn missing_input_fails_but_still_clears_marker() {
        let fx = fixture();
        let key = fx.queue.submit(Stage::SuperResolution, "gone.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            settings(),
        );
        assert_matches!(watcher.dispatch(&key).await, StageOutcome::Failed { .. });
        assert!(dir_names(&fx.layout.inputs_dir).is_empty());
        assert!(dir_names(&fx.layout.outputs_dir).is_empty());
    }

    // -- Scheduling --------------------------------------------------------

    #[tokio::test]
    async fn scan_dispatches_pending_jobs_sequentially_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path(), dir.path());
        for name in ["esrgan_c.png", "esrgan_a.png", "esrgan_b.png"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }

        let queue = Arc::new(MemoryQueue::new());
        for name in ["esrgan_c.png", "esrgan_a.png", "esrgan_b.png"] {
            queue.submit(Stage::FaceRestoration, name).await.unwrap();
        }
        let recorder = Arc::new(RecordingEnhancer {
            seen: Mutex::new(Vec::new()),
        });

        let watcher = StageWatcher::new(
            Stage::FaceRestoration,
            layout,
            queue.clone(),
            recorder.clone(),
            settings(),
        );
        let dispatched = watcher.scan_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(dispatched, 3);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec!["esrgan_a.png", "esrgan_b.png", "esrgan_c.png"]
        );
        assert!(queue.pending(Stage::FaceRestoration).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_ignores_other_stages() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path(), dir.path());
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Stage::SuperResolution, "a.png").await.unwrap();

        let watcher = StageWatcher::new(
            Stage::FaceRestoration,
            layout,
            queue.clone(),
            scripted(EnhancerKind::FaceRestoration, Script::Fail),
            settings(),
        );
        assert_eq!(watcher.scan_once(&CancellationToken::new()).await.unwrap(), 0);
        assert_eq!(queue.pending(Stage::SuperResolution).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_picks_up_new_markers_and_stops_on_cancel() {
        let fx = fixture();
        let watcher = Arc::new(StageWatcher::new(
            Stage::FaceRestoration,
            fx.layout.clone(),
            fx.queue.clone(),
            scripted(EnhancerKind::FaceRestoration, Script::Fail),
            settings(),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let watcher = Arc::clone(&watcher);
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.run(cancel).await })
        };

        write_png(&fx.layout.outputs_dir.join("esrgan_a.png"), 2, 2);
        let key = fx.queue.submit(Stage::FaceRestoration, "esrgan_a.png").await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !fx.queue.poll(&key).await.unwrap().is_done() {
            assert!(Instant::now() < deadline, "watcher never processed the job");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn run_survives_scan_errors() {
        let dir = tempfile::tempdir().unwrap();
        // Marker directory does not exist, so every scan fails.
        let layout = StorageLayout::new(dir.path().join("missing"), dir.path().join("missing"));
        let queue = Arc::new(MarkerQueue::new(layout.clone()));
        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            layout,
            queue,
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            settings(),
        );

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), watcher.run(cancel))
            .await
            .expect("watcher did not stop");
    }

    #[tokio::test]
    async fn scan_error_waits_for_backoff_not_scan_interval() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(BrokenQueue::default());
        let watcher = StageWatcher::new(
            Stage::SuperResolution,
            StorageLayout::new(dir.path(), dir.path()),
            queue.clone(),
            scripted(EnhancerKind::SuperResolution, Script::Fail),
            WatcherSettings {
                scan_interval: Duration::from_millis(10),
                error_backoff: Duration::from_millis(400),
                ..settings()
            },
        );

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            stopper.cancel();
        });
        tokio::time::timeout(Duration::from_secs(2), watcher.run(cancel))
            .await
            .expect("watcher did not stop");

        // Scans at 0 ms and 400 ms; a 10 ms cadence would have made dozens.
        assert_eq!(queue.scans.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandoned_job_still_publishes_over_fallback_copy() {
        let fx = fixture();
        let watcher = Arc::new(StageWatcher::new(
            Stage::SuperResolution,
            fx.layout.clone(),
            fx.queue.clone(),
            Arc::new(SlowEnhancer {
                delay: Duration::from_millis(600),
                bytes: b"ENHANCED",
            }),
            settings(),
        ));
        let cancel = CancellationToken::new();
        let handle = {
            let watcher = Arc::clone(&watcher);
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.run(cancel).await })
        };

        let policy = WaitPolicy {
            max_wait: Duration::from_millis(250),
            poll_interval: Duration::from_millis(20),
        };
        let orchestrator = Orchestrator::new(
            fx.layout.clone(),
            fx.queue.clone(),
            StagePolicies {
                super_resolution: policy,
                face_restoration: policy,
            },
        );
        let result = orchestrator.enhance_upload("a.png", b"ORIGINAL").await.unwrap();
        assert!(result.fell_back);

        let artifact = fx.layout.outputs_dir.join("esrgan_a.png");
        assert_eq!(std::fs::read(&artifact).unwrap(), b"ORIGINAL");

        // The worker was mid-inference when the job was abandoned; its
        // result lands last and replaces the copied original.
        let deadline = Instant::now() + Duration::from_secs(5);
        while std::fs::read(&artifact).unwrap() != b"ENHANCED" {
            assert!(Instant::now() < deadline, "late enhancer output never landed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(dir_names(&fx.layout.outputs_dir), vec!["esrgan_a.png"]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[test]
    fn default_settings_follow_stage_budget() {
        let s = WatcherSettings::for_stage(Stage::FaceRestoration);
        assert_eq!(s.budget, Duration::from_secs(300));
        assert_eq!(s.scan_interval, Duration::from_secs(2));
        assert_eq!(s.error_backoff, Duration::from_secs(5));
    }
}
