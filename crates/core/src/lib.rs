//! # concord-core
//!
//! Shared error type, identifiers and Railway-style result helpers used by every
//! concord crate.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod ids;
pub mod parse;
pub mod result;

pub use error::Error;
pub use ids::{AgentId, SessionId};
pub use result::{OptionExt, Result, ResultExt};
