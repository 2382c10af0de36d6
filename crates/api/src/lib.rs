//! Relume web service library.
//!
//! Exposes the building blocks (config, state, error handling, routes, the
//! router builder) so integration tests and the binary entrypoint share
//! them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod router;
pub mod routes;
pub mod state;
