//! Domain types shared by the Relume web service and stage workers.
//!
//! Nothing in this crate touches the network or spawns processes; it holds
//! the naming rules, stage definitions and configuration helpers that both
//! sides of the marker protocol must agree on.

pub mod config;
pub mod device;
pub mod error;
pub mod layout;
pub mod naming;
pub mod stage;
pub mod types;
pub mod upload;
