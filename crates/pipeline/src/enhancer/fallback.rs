//! Cheap deterministic substitutes used when a model fails.
//!
//! A stage always ends with some artifact: super-resolution falls back to a
//! plain Lanczos upscale, the other stages to a byte copy of their input.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use super::{EnhancerKind, InferenceError};

/// Scale applied by the super-resolution model and its fallback.
pub const DEFAULT_UPSCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTransform {
    /// Upscale both dimensions by `scale` with a Lanczos filter.
    Resize { scale: u32 },
    /// Copy the input bytes unchanged.
    Copy,
}

impl FallbackTransform {
    /// Fallback for `kind`, using `upscale` for super-resolution.
    pub fn for_kind(kind: EnhancerKind, upscale: u32) -> Self {
        match kind {
            EnhancerKind::SuperResolution => Self::Resize {
                scale: upscale.max(1),
            },
            EnhancerKind::FaceRestoration | EnhancerKind::Inpainting => Self::Copy,
        }
    }

    /// Produce `output` from `input`.
    pub async fn apply(self, input: &Path, output: &Path) -> Result<(), InferenceError> {
        match self {
            Self::Copy => {
                tokio::fs::copy(input, output).await?;
                Ok(())
            }
            Self::Resize { scale } => {
                let input: PathBuf = input.to_path_buf();
                let output: PathBuf = output.to_path_buf();
                tokio::task::spawn_blocking(move || resize_file(&input, &output, scale))
                    .await
                    .map_err(|e| InferenceError::Panicked(e.to_string()))?
            }
        }
    }
}

fn resize_file(input: &Path, output: &Path, scale: u32) -> Result<(), InferenceError> {
    // Decode to 8-bit RGB so every output format (JPEG included) can encode it.
    let img = DynamicImage::ImageRgb8(image::open(input)?.to_rgb8());
    let (width, height) = img.dimensions();
    let resized = img.resize_exact(
        width.saturating_mul(scale),
        height.saturating_mul(scale),
        FilterType::Lanczos3,
    );
    resized.save(output)?;
    Ok(())
}
