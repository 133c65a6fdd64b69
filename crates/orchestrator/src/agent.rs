//! The agent capability set.

use async_trait::async_trait;
use concord_blackboard::{AuthorityLevel, BlackboardView, ConflictRecord, Proposal};
use concord_core::AgentId;

use crate::error::Result;

/// Spaces an agent writes unless it declares otherwise.
pub const DEFAULT_WRITE_SCOPE: [&str; 2] = ["processed", "validated"];

/// An expert taking part in a session.
///
/// Agents never write the blackboard themselves: `propose` returns candidate writes
/// computed against the view's basis clock, and the orchestrator decides which of them
/// are committed.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    fn authority(&self) -> AuthorityLevel;

    /// Knowledge spaces this agent may write.
    fn write_scope(&self) -> Vec<String> {
        DEFAULT_WRITE_SCOPE.iter().map(ToString::to_string).collect()
    }

    /// Whether this agent has anything to say about `requirement`.
    fn can_handle(&self, requirement: &str) -> bool;

    /// Candidate writes for the session's requirement.
    ///
    /// # Errors
    ///
    /// A failure isolates this agent for the session; others continue.
    async fn propose(&self, view: BlackboardView) -> Result<Vec<Proposal>>;

    /// Called when a Primary agent's proposal overrode `vetoed`.
    fn on_veto(&self, _vetoed: &Proposal, _record: &ConflictRecord) {}
}

/// Whether `text` contains any of `keywords`, case-insensitively.
#[must_use]
pub fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|keyword| text.contains(keyword))
}
