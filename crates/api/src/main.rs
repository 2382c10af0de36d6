use std::net::SocketAddr;
use std::sync::Arc;

use relume_api::config::ServerConfig;
use relume_api::router::build_app_router;
use relume_api::state::AppState;
use relume_core::config::LogFormat;
use relume_pipeline::orchestrator::Orchestrator;
use relume_pipeline::queue::MarkerQueue;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let log_format = LogFormat::from_env();
    let json_logs = matches!(log_format, Ok(LogFormat::Json));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relume_api=debug,relume_pipeline=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();
    if let Err(e) = log_format {
        tracing::warn!(error = %e, "Invalid LOG_FORMAT, using text");
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid server configuration");
        std::process::exit(1);
    });
    tracing::info!(
        host = %config.host,
        port = %config.port,
        inputs = %config.layout.inputs_dir.display(),
        outputs = %config.layout.outputs_dir.display(),
        "Loaded server configuration",
    );

    // --- Storage ---
    config
        .layout
        .ensure_dirs()
        .await
        .expect("Failed to create storage directories");

    // --- Orchestrator ---
    let queue = Arc::new(MarkerQueue::new(config.layout.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        config.layout.clone(),
        queue,
        config.stage_policies,
    ));

    // --- App state ---
    let state = AppState { orchestrator };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
