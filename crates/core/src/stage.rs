//! Restoration stages and their fixed on-disk literals.
//!
//! Every literal here is part of the marker protocol: the web service and
//! the stage workers run as separate processes and only agree through these
//! names, so changing one breaks interoperability with running workers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Marker suffix watched by the super-resolution worker.
pub const SUPER_RESOLUTION_SUFFIX: &str = "process_esrgan";

/// Marker suffix watched by the face-restoration worker.
pub const FACE_RESTORATION_SUFFIX: &str = "process_gfpgan";

/// Filename prefix of super-resolution artifacts.
pub const SUPER_RESOLUTION_PREFIX: &str = "esrgan_";

/// Filename prefix of face-restoration artifacts.
pub const FACE_RESTORATION_PREFIX: &str = "final_enhanced_";

/// Wall-clock budget for one super-resolution inference.
pub const SUPER_RESOLUTION_BUDGET: Duration = Duration::from_secs(600);

/// Wall-clock budget for one face-restoration inference.
pub const FACE_RESTORATION_BUDGET: Duration = Duration::from_secs(300);

/// How long the web service waits for either stage before giving up.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Interval between completion checks and between worker scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One phase of the restoration pipeline.
///
/// Stages run in order; face restoration is optional and always reads a
/// super-resolution artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SuperResolution,
    FaceRestoration,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 2] = [Stage::SuperResolution, Stage::FaceRestoration];

    /// Parse a stage name as used in worker configuration.
    ///
    /// Accepts the canonical snake_case name and the model shorthand
    /// (`esrgan`, `gfpgan`), case-insensitively.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "super_resolution" | "esrgan" => Ok(Self::SuperResolution),
            "face_restoration" | "gfpgan" => Ok(Self::FaceRestoration),
            other => Err(CoreError::Validation(format!(
                "Unknown stage '{other}'. Must be one of: super_resolution, face_restoration"
            ))),
        }
    }

    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::SuperResolution => "super_resolution",
            Self::FaceRestoration => "face_restoration",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::SuperResolution => "Super-resolution",
            Self::FaceRestoration => "Face restoration",
        }
    }

    /// Extension appended to a target filename to form its marker name.
    pub fn marker_suffix(self) -> &'static str {
        match self {
            Self::SuperResolution => SUPER_RESOLUTION_SUFFIX,
            Self::FaceRestoration => FACE_RESTORATION_SUFFIX,
        }
    }

    /// Literal written into marker files. Only existence matters to readers.
    pub fn marker_content(self) -> &'static str {
        match self {
            Self::SuperResolution => "process_esrgan_only",
            Self::FaceRestoration => "process_gfpgan",
        }
    }

    /// Prefix prepended to this stage's artifacts.
    pub fn output_prefix(self) -> &'static str {
        match self {
            Self::SuperResolution => SUPER_RESOLUTION_PREFIX,
            Self::FaceRestoration => FACE_RESTORATION_PREFIX,
        }
    }

    /// Default inference budget enforced by the worker.
    pub fn default_budget(self) -> Duration {
        match self {
            Self::SuperResolution => SUPER_RESOLUTION_BUDGET,
            Self::FaceRestoration => FACE_RESTORATION_BUDGET,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
