//! Fieldbus and network expert.

use async_trait::async_trait;
use concord_blackboard::{AuthorityLevel, BlackboardView, ConflictRecord, Proposal};
use concord_core::AgentId;

use super::{analyse, fold_values, Proposer, VetoLog};
use crate::agent::{mentions_any, Agent};
use crate::collaborators::{ConstraintCategory, Toolkit};
use crate::error::Result;

const KEYWORDS: [&str; 7] = [
    "protocol",
    "modbus",
    "ethernet",
    "network",
    "communication",
    "profinet",
    "canopen",
];

/// Proposes protocols, physical interfaces and link speed.
pub struct CommunicationExpert {
    id: AgentId,
    toolkit: Toolkit,
    vetoes: VetoLog,
}

impl CommunicationExpert {
    #[must_use]
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            id: AgentId::from("communication_expert"),
            toolkit,
            vetoes: VetoLog::default(),
        }
    }

    #[must_use]
    pub fn vetoes(&self) -> usize {
        self.vetoes.count()
    }
}

#[async_trait]
impl Agent for CommunicationExpert {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn authority(&self) -> AuthorityLevel {
        AuthorityLevel::Secondary
    }

    fn can_handle(&self, requirement: &str) -> bool {
        mentions_any(requirement, &KEYWORDS)
    }

    async fn propose(&self, view: BlackboardView) -> Result<Vec<Proposal>> {
        let analysis = analyse(&self.toolkit, &view, ConstraintCategory::Communication)?;
        if analysis.constraints.is_empty() {
            return Ok(Vec::new());
        }
        let proposer = Proposer::new(&self.id, self.authority(), &view);

        let mut proposals = proposer.processed(fold_values(&analysis.constraints));
        proposals.push(proposer.verdict(ConstraintCategory::Communication, &analysis.report));
        Ok(proposals)
    }

    fn on_veto(&self, vetoed: &Proposal, record: &ConflictRecord) {
        self.vetoes.record(&self.id, vetoed, record);
    }
}
