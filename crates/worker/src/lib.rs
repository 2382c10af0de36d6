//! Stage worker: watches one directory per stage for job markers and runs
//! the stage's enhancer on each.
//!
//! Exposed as a library so the web service's integration tests can run a
//! worker in process against the same storage layout.

pub mod config;
pub mod watcher;
