//! Proposals and conflict records.

use concord_core::AgentId;
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;

/// Authority of an agent in the merge protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityLevel {
    /// Veto power over Secondary proposals for the same key.
    Primary,
    Secondary,
}

impl std::fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}

/// A candidate write computed against a snapshot clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub agent_id: AgentId,
    pub target_space: String,
    pub key: String,
    pub value: serde_json::Value,
    pub basis_clock: VectorClock,
    pub authority: AuthorityLevel,
}

impl Proposal {
    /// Create a proposal.
    pub fn new(
        agent_id: AgentId,
        authority: AuthorityLevel,
        target_space: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
        basis_clock: VectorClock,
    ) -> Self {
        Self {
            agent_id,
            target_space: target_space.into(),
            key: key.into(),
            value,
            basis_clock,
            authority,
        }
    }

    /// `space/key` label used in logs and maps.
    #[must_use]
    pub fn slot(&self) -> String {
        format!("{}/{}", self.target_space, self.key)
    }
}

/// Why a proposal lost or was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    /// Overridden by a Primary agent's proposal for the same key.
    Vetoed { by: AgentId },
    /// Lost to a Secondary proposal with a higher priority weight.
    OutrankedByWeight,
    /// Equal weights, lost to the earlier-registered agent.
    RegistrationOrder,
    /// Neither the candidate nor the stored clock dominates.
    ConcurrentWrite,
    /// The basis clock is behind the stored entry.
    StaleBasis,
    /// Candidate clock equals the stored one and the policy forbids it.
    EqualClock,
}

impl ConflictReason {
    /// Whether this came from the blackboard's clock check rather than resolution.
    #[must_use]
    pub const fn is_commit_race(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentWrite | Self::StaleBasis | Self::EqualClock
        )
    }
}

/// A conflict between proposals, or between a proposal and the stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub space: String,
    pub key: String,
    /// Proposals involved. For resolution conflicts: the winner first, then the loser.
    pub competing: Vec<Proposal>,
    /// Agent whose value stands.
    pub winner: Option<AgentId>,
    pub reason: ConflictReason,
}

impl ConflictRecord {
    /// Agents whose proposals did not stand.
    pub fn losers(&self) -> impl Iterator<Item = &AgentId> {
        self.competing
            .iter()
            .map(|p| &p.agent_id)
            .filter(move |agent| self.winner.as_ref() != Some(*agent))
    }
}
