//! Enhancer capability.
//!
//! Every restoration model is an opaque function from an input image to an
//! output image. Workers only depend on [`Enhancer`]; which model sits
//! behind it (an external inference script, an in-process transform) is
//! chosen at startup.

mod command;
mod fallback;
mod image_fn;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use relume_core::stage::Stage;

pub use command::{ArgStyle, CommandEnhancer};
pub use fallback::{FallbackTransform, DEFAULT_UPSCALE};
pub use image_fn::ImageFnEnhancer;

/// Model family behind an enhancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancerKind {
    SuperResolution,
    FaceRestoration,
    Inpainting,
}

impl EnhancerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::SuperResolution => "super_resolution",
            Self::FaceRestoration => "face_restoration",
            Self::Inpainting => "inpainting",
        }
    }

    /// Default model family serving `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::SuperResolution => Self::SuperResolution,
            Stage::FaceRestoration => Self::FaceRestoration,
        }
    }
}

impl fmt::Display for EnhancerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One enhancement request: read `input`, write the result to `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Reasons an enhancement attempt produced no usable output.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The model process ran but exited non-zero (or was killed).
    #[error("Enhancer exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The enhancer reported success without writing its output.
    #[error("Enhancer reported success but wrote no output")]
    MissingOutput,

    #[error("Enhancer exceeded its {}s budget", budget.as_secs())]
    Timeout { budget: Duration },

    #[error("Enhancer task panicked: {0}")]
    Panicked(String),
}

/// An opaque restoration model.
///
/// Implementations write the output file themselves. They must not touch
/// markers; the worker owns the job lifecycle.
#[async_trait]
pub trait Enhancer: Send + Sync {
    fn kind(&self) -> EnhancerKind;

    async fn enhance(&self, job: &EnhanceJob) -> Result<(), InferenceError>;
}
