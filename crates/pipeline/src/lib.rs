//! Job hand-off between the web service and the stage workers.
//!
//! The web service and the workers share nothing but a filesystem. A job is
//! requested by creating a marker file next to its input, and it is finished
//! once the stage's artifact exists and the marker is gone. This crate holds
//! both halves of that protocol plus the enhancer capability the workers
//! drive:
//!
//! - [`marker`]: create, list and delete marker files
//! - [`artifact`]: write-to-temporary-then-rename artifact publication
//! - [`queue`]: the [`queue::JobQueue`] abstraction with marker-file and
//!   in-memory backends
//! - [`enhancer`]: the opaque model capability and its fallback transforms
//! - [`orchestrator`]: submit-and-wait logic used by the web service

pub mod artifact;
pub mod enhancer;
pub mod error;
pub mod marker;
pub mod orchestrator;
pub mod queue;

pub use error::{PipelineError, QueueError};
pub use queue::{JobKey, JobQueue, JobStatus};
