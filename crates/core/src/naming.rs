//! Artifact and marker naming convention.
//!
//! Output names are pure functions of the input name so the web service can
//! compute where a stage will write before the job exists.
//!
//! Convention:
//!
//! - stage 1: `esrgan_{original}`
//! - stage 2: `final_enhanced_{original}`, where every leading `esrgan_` on
//!   the input is stripped first so chaining never double-prefixes
//! - marker: `{target}.{stage_suffix}`

use crate::stage::{Stage, FACE_RESTORATION_PREFIX, SUPER_RESOLUTION_PREFIX};

/// Name of the super-resolution artifact for an uploaded file.
///
/// ```
/// use relume_core::naming::stage1_output_name;
///
/// assert_eq!(stage1_output_name("photo.jpg"), "esrgan_photo.jpg");
/// ```
pub fn stage1_output_name(original: &str) -> String {
    format!("{SUPER_RESOLUTION_PREFIX}{original}")
}

/// Name of the face-restoration artifact for a stage-1 artifact (or, when
/// the prefix is absent, for the original filename).
///
/// Leading `esrgan_` prefixes are stripped repeatedly, so an upload that is
/// itself named `esrgan_*` lands on the same name whether or not it went
/// through stage one.
///
/// ```
/// use relume_core::naming::stage2_output_name;
///
/// assert_eq!(stage2_output_name("esrgan_photo.jpg"), "final_enhanced_photo.jpg");
/// assert_eq!(stage2_output_name("photo.jpg"), "final_enhanced_photo.jpg");
/// assert_eq!(stage2_output_name("esrgan_esrgan_x.jpg"), "final_enhanced_x.jpg");
/// ```
pub fn stage2_output_name(input: &str) -> String {
    let mut base = input;
    while let Some(rest) = base.strip_prefix(SUPER_RESOLUTION_PREFIX) {
        base = rest;
    }
    format!("{FACE_RESTORATION_PREFIX}{base}")
}

/// Output name produced by `stage` for `input`.
pub fn output_name(stage: Stage, input: &str) -> String {
    match stage {
        Stage::SuperResolution => stage1_output_name(input),
        Stage::FaceRestoration => stage2_output_name(input),
    }
}

/// The uploaded filename a stage-1 artifact was derived from.
///
/// Inverts [`stage1_output_name`] exactly, so a single `esrgan_` is removed.
/// For a stage-2 artifact this is the name with `final_enhanced_` removed.
pub fn original_name(artifact: &str) -> &str {
    artifact
        .strip_prefix(FACE_RESTORATION_PREFIX)
        .or_else(|| artifact.strip_prefix(SUPER_RESOLUTION_PREFIX))
        .unwrap_or(artifact)
}

/// Whether `name` belongs to the protocol rather than being an artifact:
/// a hidden or in-progress file, or a job marker of any stage.
pub fn is_internal_file(name: &str) -> bool {
    name.starts_with('.')
        || Stage::ALL
            .iter()
            .any(|&stage| marker_target(name, stage).is_some())
}

/// Whether `name` is already a face-restoration artifact.
pub fn is_stage2_artifact(name: &str) -> bool {
    name.starts_with(FACE_RESTORATION_PREFIX)
}

/// Marker filename for `target` at `stage`.
pub fn marker_name(target: &str, stage: Stage) -> String {
    format!("{target}.{}", stage.marker_suffix())
}

/// Recover the target filename from a marker filename.
///
/// Returns `None` when `marker` does not carry `stage`'s suffix or the
/// target would be empty.
pub fn marker_target(marker: &str, stage: Stage) -> Option<&str> {
    marker
        .strip_suffix(stage.marker_suffix())
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|target| !target.is_empty())
}
