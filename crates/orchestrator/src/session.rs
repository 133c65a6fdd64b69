//! Session state machine and outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use concord_blackboard::{Blackboard, ConflictRecord};
use concord_core::{AgentId, SessionId};
use serde::{Serialize, Serializer};

/// Phase of one orchestrator session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Routing,
    Dispatching,
    Collecting,
    Resolving,
    Committing,
    Completed,
    Failed,
}

impl SessionPhase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows `self -> next`.
    ///
    /// `Committing -> Resolving` is the commit-race retry; the session enforces that it
    /// happens at most once.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Failed)
            | (Self::Routing, Self::Dispatching)
            | (Self::Dispatching, Self::Collecting)
            | (Self::Collecting, Self::Resolving)
            | (Self::Resolving, Self::Committing)
            | (Self::Committing, Self::Resolving | Self::Completed) => true,
            _ => false,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Dispatching => "dispatching",
            Self::Collecting => "collecting",
            Self::Resolving => "resolving",
            Self::Committing => "committing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase tracker that rejects illegal transitions and records history.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: SessionPhase,
    history: Vec<SessionPhase>,
    retried: bool,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            current: SessionPhase::Routing,
            history: vec![SessionPhase::Routing],
            retried: false,
        }
    }
}

impl PhaseMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn current(&self) -> SessionPhase {
        self.current
    }

    #[must_use]
    pub fn history(&self) -> &[SessionPhase] {
        &self.history
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the table forbids it, or on a second
    /// `Committing -> Resolving` retry.
    pub fn advance(&mut self, next: SessionPhase) -> concord_core::Result<()> {
        let retry = self.current == SessionPhase::Committing && next == SessionPhase::Resolving;
        if !self.current.can_transition_to(next) || (retry && self.retried) {
            return Err(concord_core::Error::invalid_transition(
                self.current.as_str(),
                next.as_str(),
            ));
        }
        self.retried |= retry;
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

/// Terminal status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Failed,
}

/// A contained failure the caller may want to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Incident {
    /// A proposal targeted a space outside the agent's write scope.
    PermissionDenied {
        agent: AgentId,
        space: String,
        key: String,
    },
    /// The agent missed the dispatch deadline and abstained.
    AgentTimeout { agent: AgentId },
    /// The agent failed and was excluded.
    AgentFailure { agent: AgentId, reason: String },
}

/// Result of `Orchestrator::process`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Committed winners, `space/key -> value`.
    pub consolidated: BTreeMap<String, serde_json::Value>,
    /// Losing proposals, plus the commit races when the session failed.
    pub conflicts: Vec<ConflictRecord>,
    pub incidents: Vec<Incident>,
    pub phases: Vec<SessionPhase>,
    #[serde(serialize_with = "serialize_snapshot")]
    pub blackboard: Arc<Blackboard>,
}

impl SessionOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

fn serialize_snapshot<S: Serializer>(
    blackboard: &Arc<Blackboard>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    blackboard.snapshot().serialize(serializer)
}
