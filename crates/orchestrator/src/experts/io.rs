//! I/O configuration expert, the Primary authority.

use async_trait::async_trait;
use concord_blackboard::{AuthorityLevel, BlackboardView, Proposal};
use concord_core::{AgentId, OptionExt};
use tracing::debug;

use super::{analyse, fold_values, Proposer, PROCESSED_SPACE};
use crate::agent::{mentions_any, Agent};
use crate::collaborators::query::paths;
use crate::collaborators::{keys, Constraint, ConstraintCategory, ConstraintValue, Toolkit};
use crate::error::Result;

const KEYWORDS: [&str; 8] = [
    "input", "output", "channel", "digital", "analog", "i/o", "dio", "aio",
];

/// Determines I/O counts and the expansion modules they need. Its proposals override
/// any Secondary proposal for the same key, including fieldbus protocols named
/// alongside I/O.
pub struct IoExpert {
    id: AgentId,
    toolkit: Toolkit,
}

impl IoExpert {
    #[must_use]
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            id: AgentId::from("io_expert"),
            toolkit,
        }
    }

    /// Modules needed per signal type for the requested point counts.
    fn expansion_modules(&self, constraints: &[Constraint]) -> Option<serde_json::Value> {
        let total = |prefix: &str| -> u64 {
            fold_values(constraints.iter().filter(|c| c.key.starts_with(prefix)))
                .values()
                .filter_map(serde_json::Value::as_u64)
                .fold(0, u64::saturating_add)
        };
        let modules = |points: u64, path: &str| {
            self.toolkit
                .query
                .query_u64(path)
                .tap_none(|| debug!(path, "Catalog lacks a channel count"))
                .filter(|per_module| *per_module > 0)
                .map(|per_module| points.div_ceil(per_module))
        };

        let digital = modules(total("io.digital_"), paths::DIGITAL_CHANNELS_PER_MODULE)?;
        let analog = modules(total("io.analog_"), paths::ANALOG_CHANNELS_PER_MODULE)?;
        (digital > 0 || analog > 0)
            .then(|| serde_json::json!({ "digital": digital, "analog": analog }))
    }
}

#[async_trait]
impl Agent for IoExpert {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn authority(&self) -> AuthorityLevel {
        AuthorityLevel::Primary
    }

    fn can_handle(&self, requirement: &str) -> bool {
        mentions_any(requirement, &KEYWORDS)
    }

    async fn propose(&self, view: BlackboardView) -> Result<Vec<Proposal>> {
        let analysis = analyse(&self.toolkit, &view, ConstraintCategory::Io)?;
        if analysis.constraints.is_empty() {
            return Ok(Vec::new());
        }
        let proposer = Proposer::new(&self.id, self.authority(), &view);

        let mut proposals = proposer.processed(fold_values(&analysis.constraints));

        if let Some(modules) = self.expansion_modules(&analysis.constraints) {
            proposals.push(proposer.propose(PROCESSED_SPACE, keys::EXPANSION_MODULES, modules));
        }

        // Protocols named in the same sentence as I/O points are I/O decisions.
        let io_sentences: Vec<&str> = analysis.parsed.sentences_in(ConstraintCategory::Io).collect();
        let io_protocols = fold_values(analysis.parsed.constraints.iter().filter(|c| {
            c.key == keys::PROTOCOL
                && matches!(c.value, ConstraintValue::Name(_))
                && io_sentences.contains(&c.source.as_str())
        }));
        proposals.extend(proposer.processed(io_protocols));

        proposals.push(proposer.verdict(ConstraintCategory::Io, &analysis.report));
        Ok(proposals)
    }
}
