use std::time::Duration;

use relume_core::config::{env_millis, env_or, env_secs, env_string, split_list};
use relume_core::device::{Device, DevicePreference};
use relume_core::error::CoreError;
use relume_core::layout::StorageLayout;
use relume_core::stage::{Stage, DEFAULT_POLL_INTERVAL};
use relume_pipeline::enhancer::{ArgStyle, CommandEnhancer, EnhancerKind, DEFAULT_UPSCALE};

use crate::watcher::WatcherSettings;

/// Default pause after a failed scan.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Default inference commands for the container image. These scripts take
/// bare file names and resolve them against their own mounted input and
/// output directories, hence the `names` default for `ENHANCER_ARGS`.
pub const DEFAULT_ESRGAN_COMMAND: &str = "python /app/process_realesrgan_only.py";
pub const DEFAULT_GFPGAN_COMMAND: &str = "python /app/process_gfpgan_only.py";
pub const DEFAULT_ARG_STYLE: &str = "names";

/// How one stage is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSettings {
    pub stage: Stage,
    /// Program and arguments; input and output are appended.
    pub command: String,
    /// Whether the appended input and output are full paths or file names.
    pub arg_style: ArgStyle,
    /// Wall-clock budget per inference.
    pub budget: Duration,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub layout: StorageLayout,
    /// Stages this process watches, one watcher each.
    pub stages: Vec<StageSettings>,
    pub device: DevicePreference,
    pub scan_interval: Duration,
    pub error_backoff: Duration,
    /// Scale factor of the super-resolution fallback.
    pub upscale: u32,
    /// How long shutdown waits for an in-flight job.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                   |
    /// |-------------------------|-------------------------------------------|
    /// | `WORKER_STAGES`         | `super_resolution,face_restoration`       |
    /// | `RELUME_INPUTS_DIR`     | `./data/inputs`                           |
    /// | `RELUME_OUTPUTS_DIR`    | `./data/outputs`                          |
    /// | `RELUME_DEVICE`         | `auto`                                    |
    /// | `SCAN_INTERVAL_MS`      | `2000`                                    |
    /// | `ERROR_BACKOFF_MS`      | `5000`                                    |
    /// | `ESRGAN_COMMAND`        | `python /app/process_realesrgan_only.py`  |
    /// | `GFPGAN_COMMAND`        | `python /app/process_gfpgan_only.py`      |
    /// | `ENHANCER_ARGS`         | `names` (or `paths`)                      |
    /// | `ESRGAN_BUDGET_SECS`    | `600`                                     |
    /// | `GFPGAN_BUDGET_SECS`    | `300`                                     |
    /// | `UPSCALE_FACTOR`        | `4`                                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                                      |
    pub fn from_env() -> Result<Self, CoreError> {
        let stage_names = split_list(&env_string(
            "WORKER_STAGES",
            "super_resolution,face_restoration",
        ));
        let stages = parse_stages(&stage_names)?
            .into_iter()
            .map(stage_settings_from_env)
            .collect::<Result<Vec<_>, _>>()?;

        let upscale: u32 = env_or("UPSCALE_FACTOR", DEFAULT_UPSCALE)?;
        if upscale == 0 {
            return Err(CoreError::Validation("UPSCALE_FACTOR must be at least 1".into()));
        }

        Ok(Self {
            layout: StorageLayout::from_env(),
            stages,
            device: DevicePreference::from_name(&env_string("RELUME_DEVICE", "auto"))?,
            scan_interval: env_millis("SCAN_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?,
            error_backoff: env_millis("ERROR_BACKOFF_MS", DEFAULT_ERROR_BACKOFF)?,
            upscale,
            shutdown_timeout: env_secs("SHUTDOWN_TIMEOUT_SECS", Duration::from_secs(30))?,
        })
    }

    /// Loop timing for `stage`'s watcher.
    pub fn watcher_settings(&self, stage: &StageSettings) -> WatcherSettings {
        WatcherSettings {
            scan_interval: self.scan_interval,
            error_backoff: self.error_backoff,
            budget: stage.budget,
            upscale: self.upscale,
        }
    }
}

impl StageSettings {
    /// Build the external-process enhancer for this stage.
    pub fn enhancer(&self, device: Device) -> Result<CommandEnhancer, CoreError> {
        let enhancer =
            CommandEnhancer::from_command_line(EnhancerKind::for_stage(self.stage), &self.command, device)?;
        Ok(enhancer.with_arg_style(self.arg_style))
    }
}

/// Parse stage names, rejecting repeats: two watchers on one directory
/// would race each other for the same markers.
pub fn parse_stages(names: &[String]) -> Result<Vec<Stage>, CoreError> {
    if names.is_empty() {
        return Err(CoreError::Validation("WORKER_STAGES must name at least one stage".into()));
    }

    let mut stages = Vec::with_capacity(names.len());
    for name in names {
        let stage = Stage::from_name(name)?;
        if stages.contains(&stage) {
            return Err(CoreError::Conflict(format!(
                "Stage '{stage}' is listed more than once in WORKER_STAGES"
            )));
        }
        stages.push(stage);
    }
    Ok(stages)
}

fn stage_settings_from_env(stage: Stage) -> Result<StageSettings, CoreError> {
    let (command_var, budget_var, default_command) = match stage {
        Stage::SuperResolution => ("ESRGAN_COMMAND", "ESRGAN_BUDGET_SECS", DEFAULT_ESRGAN_COMMAND),
        Stage::FaceRestoration => ("GFPGAN_COMMAND", "GFPGAN_BUDGET_SECS", DEFAULT_GFPGAN_COMMAND),
    };
    Ok(StageSettings {
        stage,
        command: env_string(command_var, default_command),
        arg_style: ArgStyle::from_name(&env_string("ENHANCER_ARGS", DEFAULT_ARG_STYLE))?,
        budget: env_secs(budget_var, stage.default_budget())?,
    })
}
