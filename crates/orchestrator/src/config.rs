//! Configuration for orchestrator sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use concord_core::AgentId;
use serde::{Deserialize, Serialize};

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Shared deadline for every agent's `propose` in one session.
    #[serde(default = "default_dispatch_deadline_ms")]
    pub dispatch_deadline_ms: u64,

    /// Priority weight per agent, used to break ties between Secondary proposals.
    #[serde(default = "default_agent_weights")]
    pub agent_weights: BTreeMap<AgentId, u32>,

    /// Weight of agents missing from `agent_weights`.
    #[serde(default = "default_weight")]
    pub default_weight: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_deadline_ms: default_dispatch_deadline_ms(),
            agent_weights: default_agent_weights(),
            default_weight: default_weight(),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dispatch_deadline(mut self, deadline: Duration) -> Self {
        self.dispatch_deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_agent_weight(mut self, agent: impl Into<AgentId>, weight: u32) -> Self {
        self.agent_weights.insert(agent.into(), weight);
        self
    }

    #[must_use]
    pub const fn with_default_weight(mut self, weight: u32) -> Self {
        self.default_weight = weight;
        self
    }

    #[must_use]
    pub const fn dispatch_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch_deadline_ms)
    }

    /// Configured weight of `agent`.
    #[must_use]
    pub fn weight_of(&self, agent: &AgentId) -> u32 {
        self.agent_weights
            .get(agent)
            .copied()
            .unwrap_or(self.default_weight)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the dispatch deadline is zero.
    pub fn validate(&self) -> concord_core::Result<()> {
        if self.dispatch_deadline_ms == 0 {
            return Err(concord_core::Error::invalid_config(
                "dispatch_deadline_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn default_dispatch_deadline_ms() -> u64 {
    30_000
}

fn default_agent_weights() -> BTreeMap<AgentId, u32> {
    [
        ("io_expert", 1000),
        ("system_expert", 100),
        ("communication_expert", 100),
    ]
    .into_iter()
    .map(|(agent, weight)| (AgentId::from(agent), weight))
    .collect()
}

fn default_weight() -> u32 {
    1
}
