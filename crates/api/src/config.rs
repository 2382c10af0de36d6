use std::time::Duration;

use relume_core::config::{env_millis, env_or, env_secs, env_string, split_list};
use relume_core::error::CoreError;
use relume_core::layout::StorageLayout;
use relume_core::stage::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use relume_pipeline::orchestrator::StagePolicies;
use relume_pipeline::queue::WaitPolicy;

/// Default cap on request bodies (32 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Must exceed the stage waits, since
    /// upload and stage-2 requests block until their stage finishes.
    pub request_timeout_secs: u64,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Shared storage directories.
    pub layout: StorageLayout,
    /// How long and how often each stage is polled.
    pub stage_policies: StagePolicies,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `3000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `1500`                  |
    /// | `MAX_UPLOAD_BYTES`       | `33554432`              |
    /// | `RELUME_INPUTS_DIR`      | `./data/inputs`         |
    /// | `RELUME_OUTPUTS_DIR`     | `./data/outputs`        |
    /// | `STAGE1_MAX_WAIT_SECS`   | `600`                   |
    /// | `STAGE2_MAX_WAIT_SECS`   | `600`                   |
    /// | `STAGE_POLL_INTERVAL_MS` | `2000`                  |
    pub fn from_env() -> Result<Self, CoreError> {
        let poll_interval = env_millis("STAGE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?;
        let stage_policies = StagePolicies {
            super_resolution: WaitPolicy {
                max_wait: env_secs("STAGE1_MAX_WAIT_SECS", DEFAULT_MAX_WAIT)?,
                poll_interval,
            },
            face_restoration: WaitPolicy {
                max_wait: env_secs("STAGE2_MAX_WAIT_SECS", DEFAULT_MAX_WAIT)?,
                poll_interval,
            },
        };

        let config = Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_or("PORT", 3000)?,
            cors_origins: split_list(&env_string("CORS_ORIGINS", "http://localhost:5173")),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 1500)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            layout: StorageLayout::from_env(),
            stage_policies,
        };

        if config.request_timeout() <= config.longest_stage_wait() {
            tracing::warn!(
                request_timeout_secs = config.request_timeout_secs,
                "REQUEST_TIMEOUT_SECS does not exceed the stage waits; slow stages will surface as 408",
            );
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Worst-case wait of a single request (the longer of the two stages).
    pub fn longest_stage_wait(&self) -> Duration {
        let sr = self.stage_policies.super_resolution;
        let fr = self.stage_policies.face_restoration;
        (sr.max_wait + sr.poll_interval).max(fr.max_wait + fr.poll_interval)
    }
}
