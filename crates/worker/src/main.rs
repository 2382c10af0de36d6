//! `relume-worker` -- stage worker daemon.
//!
//! Watches the shared storage directories for job markers and runs the
//! configured enhancer for each stage listed in `WORKER_STAGES`. See
//! [`relume_worker::config::WorkerConfig::from_env`] for the environment
//! variables.

use std::sync::Arc;

use relume_core::config::LogFormat;
use relume_core::device::HostFacts;
use relume_pipeline::queue::MarkerQueue;
use relume_pipeline::JobQueue;
use relume_worker::config::WorkerConfig;
use relume_worker::watcher::StageWatcher;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let log_format = LogFormat::from_env();
    let json_logs = matches!(log_format, Ok(LogFormat::Json));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relume_worker=debug,relume_pipeline=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();
    if let Err(e) = log_format {
        tracing::warn!(error = %e, "Invalid LOG_FORMAT, using text");
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid worker configuration");
        std::process::exit(1);
    });

    config
        .layout
        .ensure_dirs()
        .await
        .expect("Failed to create storage directories");

    // --- Device ---
    let device = config.device.resolve(&HostFacts::detect());
    tracing::info!(
        %device,
        inputs = %config.layout.inputs_dir.display(),
        outputs = %config.layout.outputs_dir.display(),
        "Starting relume-worker",
    );

    // --- Watchers ---
    let queue: Arc<dyn JobQueue> = Arc::new(MarkerQueue::new(config.layout.clone()));
    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(config.stages.len());

    for stage in &config.stages {
        let enhancer = stage.enhancer(device).unwrap_or_else(|e| {
            tracing::error!(stage = %stage.stage, error = %e, "Invalid enhancer command");
            std::process::exit(1);
        });
        tracing::info!(
            stage = %stage.stage,
            program = enhancer.program(),
            arg_style = ?enhancer.arg_style(),
            budget_secs = stage.budget.as_secs(),
            "Enhancer configured",
        );

        let watcher = StageWatcher::new(
            stage.stage,
            config.layout.clone(),
            Arc::clone(&queue),
            Arc::new(enhancer),
            config.watcher_settings(stage),
        );
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { watcher.run(cancel).await }));
    }

    shutdown_signal().await;

    // --- Shutdown ---
    // Watchers finish the job they are on before exiting.
    cancel.cancel();
    for handle in handles {
        if tokio::time::timeout(config.shutdown_timeout, handle).await.is_err() {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout.as_secs(),
                "Watcher did not stop in time, abandoning in-flight job",
            );
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
