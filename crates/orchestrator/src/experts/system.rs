//! Processing platform expert: CPU, memory and timing requirements.

use async_trait::async_trait;
use concord_blackboard::{AuthorityLevel, BlackboardView, ConflictRecord, Proposal};
use concord_core::AgentId;

use super::{analyse, fold_values, Proposer, VetoLog, PROCESSED_SPACE};
use crate::agent::{mentions_any, Agent};
use crate::collaborators::query::paths;
use crate::collaborators::{keys, ConstraintCategory, Toolkit};
use crate::error::Result;

const KEYWORDS: [&str; 7] = [
    "processor", "memory", "performance", "speed", "cpu", "ram", "real-time",
];

pub struct SystemExpert {
    id: AgentId,
    toolkit: Toolkit,
    vetoes: VetoLog,
}

impl SystemExpert {
    #[must_use]
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            id: AgentId::from("system_expert"),
            toolkit,
            vetoes: VetoLog::default(),
        }
    }

    /// Proposals of this expert overridden by a Primary agent so far.
    #[must_use]
    pub fn vetoes(&self) -> usize {
        self.vetoes.count()
    }
}

#[async_trait]
impl Agent for SystemExpert {
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
        let analysis = analyse(&self.toolkit, &view, ConstraintCategory::System)?;
        if analysis.constraints.is_empty() {
            return Ok(Vec::new());
        }
        let proposer = Proposer::new(&self.id, self.authority(), &view);
        let values = fold_values(&analysis.constraints);

        // Real-time without a stated clock speed gets the catalog floor.
        let cpu_floor = (values.contains_key(keys::REAL_TIME) && !values.contains_key(keys::CPU_MHZ))
            .then(|| self.toolkit.query.query(paths::MIN_CPU_MHZ_REAL_TIME))
            .flatten();

        let mut proposals = proposer.processed(values);
        if let Some(mhz) = cpu_floor {
            proposals.push(proposer.propose(PROCESSED_SPACE, keys::CPU_MHZ, mhz));
        }
        proposals.push(proposer.verdict(ConstraintCategory::System, &analysis.report));
        Ok(proposals)
    }

    fn on_veto(&self, vetoed: &Proposal, record: &ConflictRecord) {
        self.vetoes.record(&self.id, vetoed, record);
    }
}
