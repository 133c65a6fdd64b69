//! Error types for the orchestrator.
//!
//! Agent failures, timeouts and commit races are contained inside a session and
//! reported through `SessionOutcome`. These errors cover construction mistakes and
//! failures an individual agent reports from `propose`.

use concord_core::AgentId;
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator error types.
#[derive(Debug, Error)]
pub enum Error {
    /// An agent could not produce proposals.
    #[error("agent '{agent}' failed: {reason}")]
    AgentFailed { agent: AgentId, reason: String },

    /// Two registered agents share an identifier.
    #[error("agent '{agent}' is registered twice")]
    DuplicateAgent { agent: AgentId },

    #[error(transparent)]
    Blackboard(#[from] concord_blackboard::Error),

    #[error(transparent)]
    Events(#[from] concord_events::Error),

    /// Configuration, parse or state-machine failure.
    #[error(transparent)]
    Core(#[from] concord_core::Error),
}

impl Error {
    /// Create an agent failure.
    pub fn agent_failed(agent: &AgentId, reason: impl Into<String>) -> Self {
        Self::AgentFailed {
            agent: agent.clone(),
            reason: reason.into(),
        }
    }
}
