#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # Concord
//!
//! Command-line front end and settings for the concord workspace: expert agents that
//! merge their proposals on a vector-clocked blackboard.

pub mod cli;
pub mod commands;
pub mod settings;

pub use settings::Settings;

pub use concord_blackboard;
pub use concord_core;
pub use concord_events;
pub use orchestrator;
