use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;

use super::{EnhanceJob, Enhancer, EnhancerKind, InferenceError};

type Transform = dyn Fn(DynamicImage) -> Result<DynamicImage, InferenceError> + Send + Sync;

/// In-process enhancer wrapping an image-to-image function.
///
/// Decoding, the transform and encoding run on the blocking pool.
#[derive(Clone)]
pub struct ImageFnEnhancer {
    kind: EnhancerKind,
    transform: Arc<Transform>,
}

impl ImageFnEnhancer {
    pub fn new<F>(kind: EnhancerKind, transform: F) -> Self
    where
        F: Fn(DynamicImage) -> Result<DynamicImage, InferenceError> + Send + Sync + 'static,
    {
        Self {
            kind,
            transform: Arc::new(transform),
        }
    }
}

impl fmt::Debug for ImageFnEnhancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFnEnhancer")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Enhancer for ImageFnEnhancer {
    fn kind(&self) -> EnhancerKind {
        self.kind
    }

    async fn enhance(&self, job: &EnhanceJob) -> Result<(), InferenceError> {
        let transform = Arc::clone(&self.transform);
        let job = job.clone();
        tokio::task::spawn_blocking(move || run(&*transform, &job.input, &job.output))
            .await
            .map_err(|e| InferenceError::Panicked(e.to_string()))?
    }
}

fn run(transform: &Transform, input: &Path, output: &Path) -> Result<(), InferenceError> {
    let img = image::open(input)?;
    let enhanced = transform(img)?;
    enhanced.save(output)?;
    Ok(())
}
