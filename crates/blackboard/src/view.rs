//! Read-only blackboard view handed to one agent.

use std::collections::BTreeMap;
use std::sync::Arc;

use concord_core::AgentId;

use crate::board::Blackboard;
use crate::clock::VectorClock;
use crate::error::Result;
use crate::space::{AgentSpace, VersionedEntry};

/// What an agent may see while proposing: shared knowledge spaces, the snapshot clock
/// its proposals are computed against, and its own private scratch space.
#[derive(Debug, Clone)]
pub struct BlackboardView {
    board: Arc<Blackboard>,
    agent: AgentId,
    basis: VectorClock,
}

impl BlackboardView {
    pub(crate) const fn new(board: Arc<Blackboard>, agent: AgentId, basis: VectorClock) -> Self {
        Self {
            board,
            agent,
            basis,
        }
    }

    /// Agent this view belongs to.
    #[must_use]
    pub const fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Snapshot clock proposals should carry as their basis.
    #[must_use]
    pub const fn basis(&self) -> &VectorClock {
        &self.basis
    }

    #[must_use]
    pub fn read(&self, space: &str, key: &str) -> Option<VersionedEntry> {
        self.board.read(space, key)
    }

    /// # Errors
    ///
    /// Returns `UnknownSpace` for a space the blackboard lacks.
    pub fn entries(&self, space: &str) -> Result<BTreeMap<String, VersionedEntry>> {
        self.board.entries(space)
    }

    /// Raw input of the session.
    #[must_use]
    pub fn requirement(&self) -> Option<String> {
        self.board.requirement()
    }

    /// This agent's private scratch space.
    #[must_use]
    pub fn scratch(&self) -> Arc<AgentSpace> {
        self.board.agent_space(&self.agent)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::board::REQUIREMENT_KEY;
    use crate::config::RAW_SPACE;

    #[test]
    fn test_scratch_is_private_per_agent() {
        let board = Arc::new(Blackboard::default());
        let a = board.view(&AgentId::from("a"), VectorClock::new());
        let b = board.view(&AgentId::from("b"), VectorClock::new());

        a.scratch().put("note", serde_json::json!("mine"));

        assert_eq!(a.scratch().get("note"), Some(serde_json::json!("mine")));
        assert!(b.scratch().get("note").is_none());
    }

    #[test]
    fn test_view_reads_requirement_and_basis() {
        let board = Arc::new(Blackboard::default());
        let orchestrator = AgentId::from("orchestrator");
        board.register_agent(&orchestrator, [RAW_SPACE]).unwrap();
        board
            .propose(
                &orchestrator,
                RAW_SPACE,
                REQUIREMENT_KEY,
                serde_json::json!("16 digital inputs"),
                &VectorClock::new(),
            )
            .unwrap();

        let view = board.view(&AgentId::from("io_expert"), board.clock());
        assert_eq!(view.requirement().as_deref(), Some("16 digital inputs"));
        assert_eq!(view.basis().get(&orchestrator), 1);
        assert_eq!(view.entries(RAW_SPACE).map(|e| e.len()).ok(), Some(1));
        assert_eq!(view.agent().as_str(), "io_expert");
    }
}
