//! Shared filesystem layout.
//!
//! Uploads and stage-1 markers live in the inputs directory; every artifact
//! and the stage-2 markers live in the outputs directory. The layout is
//! configuration, but the shape (which stage reads and writes where) is part
//! of the marker protocol.

use std::path::{Path, PathBuf};

use crate::config::env_path;
use crate::naming;
use crate::stage::Stage;

/// Default inputs directory, relative to the working directory.
pub const DEFAULT_INPUTS_DIR: &str = "./data/inputs";

/// Default outputs directory, relative to the working directory.
pub const DEFAULT_OUTPUTS_DIR: &str = "./data/outputs";

/// Directory roots shared by the web service and the stage workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub inputs_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(inputs_dir: impl Into<PathBuf>, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs_dir: inputs_dir.into(),
            outputs_dir: outputs_dir.into(),
        }
    }

    /// Load from `RELUME_INPUTS_DIR` / `RELUME_OUTPUTS_DIR`.
    pub fn from_env() -> Self {
        Self::new(
            env_path("RELUME_INPUTS_DIR", DEFAULT_INPUTS_DIR),
            env_path("RELUME_OUTPUTS_DIR", DEFAULT_OUTPUTS_DIR),
        )
    }

    /// Directory where markers for `stage` are created and scanned.
    pub fn marker_dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::SuperResolution => &self.inputs_dir,
            Stage::FaceRestoration => &self.outputs_dir,
        }
    }

    /// Directory `stage` reads its input from.
    pub fn input_dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::SuperResolution => &self.inputs_dir,
            Stage::FaceRestoration => &self.outputs_dir,
        }
    }

    /// Directory `stage` writes its artifact to.
    pub fn output_dir(&self, _stage: Stage) -> &Path {
        &self.outputs_dir
    }

    /// Full path of `stage`'s input file.
    pub fn input_path(&self, stage: Stage, input: &str) -> PathBuf {
        self.input_dir(stage).join(input)
    }

    /// Full path of the artifact `stage` produces from `input`.
    pub fn output_path(&self, stage: Stage, input: &str) -> PathBuf {
        self.output_dir(stage).join(naming::output_name(stage, input))
    }

    /// Full path of the marker for `input` at `stage`.
    pub fn marker_path(&self, stage: Stage, input: &str) -> PathBuf {
        self.marker_dir(stage).join(naming::marker_name(input, stage))
    }

    /// Create both directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.inputs_dir).await?;
        tokio::fs::create_dir_all(&self.outputs_dir).await?;
        Ok(())
    }
}
