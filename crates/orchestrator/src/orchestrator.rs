//! Session driver: routing, parallel dispatch, authority resolution and optimistic
//! commit of agent proposals.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use concord_blackboard::{
    AuthorityLevel, Blackboard, BlackboardConfig, ConflictReason, ConflictRecord, Proposal,
    WriteOutcome, RAW_SPACE, REQUIREMENT_KEY,
};
use concord_core::{AgentId, ResultExt, SessionId};
use concord_events::{topics, Message, MessageBus, Priority};
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::authority::{resolve, Ranking, Resolution};
use crate::collaborators::Toolkit;
use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::experts::default_experts;
use crate::observer::{NoopObserver, PhaseObserver};
use crate::session::{Incident, PhaseMachine, SessionOutcome, SessionPhase, SessionStatus};

/// Agent id the orchestrator writes the raw requirement under.
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// Space receiving each completed session's consolidated map, when configured.
pub const CONSOLIDATED_SPACE: &str = "consolidated";

/// Registered agent as listed by [`Orchestrator::agents`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub authority: AuthorityLevel,
    pub weight: u32,
    pub write_scope: Vec<String>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    blackboard_config: BlackboardConfig,
    bus: Option<MessageBus>,
    agents: Vec<Arc<dyn Agent>>,
    observer: Arc<dyn PhaseObserver>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            blackboard_config: BlackboardConfig::default(),
            bus: None,
            agents: Vec::new(),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn blackboard_config(mut self, config: BlackboardConfig) -> Self {
        self.blackboard_config = config;
        self
    }

    /// Bus for session events and `entry.updated` notifications.
    #[must_use]
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Register an agent. Registration order breaks ties between equal weights.
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Register the IO, system and communication experts.
    #[must_use]
    pub fn default_experts(mut self, toolkit: &Toolkit) -> Self {
        self.agents.extend(default_experts(toolkit));
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAgent` if two agents share an id, or `Core(InvalidConfig)` for
    /// an invalid orchestrator or blackboard configuration.
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        self.blackboard_config.validate()?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.agents.iter().find(|a| !seen.insert(a.id().clone())) {
            return Err(Error::DuplicateAgent {
                agent: duplicate.id().clone(),
            });
        }

        let mut ranking = Ranking::new();
        for agent in &self.agents {
            ranking.register(agent.id(), self.config.weight_of(agent.id()));
        }

        Ok(Orchestrator {
            config: self.config,
            blackboard_config: self.blackboard_config,
            bus: self.bus.unwrap_or_default(),
            agents: self.agents,
            ranking,
            observer: self.observer,
        })
    }
}

/// Coordinates agents over one blackboard per session.
pub struct Orchestrator {
    config: OrchestratorConfig,
    blackboard_config: BlackboardConfig,
    bus: MessageBus,
    agents: Vec<Arc<dyn Agent>>,
    ranking: Ranking,
    observer: Arc<dyn PhaseObserver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("agents", &self.agents.iter().map(|a| a.id()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Orchestrator with the default experts, collaborators and configuration.
    ///
    /// # Errors
    ///
    /// Only fails if the default configuration is invalid.
    pub fn with_default_experts() -> Result<Self> {
        Self::builder().default_experts(&Toolkit::default()).build()
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub const fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Registered agents in registration order.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentSummary> {
        self.agents
            .iter()
            .map(|agent| AgentSummary {
                id: agent.id().clone(),
                authority: agent.authority(),
                weight: self.ranking.weight(agent.id()),
                write_scope: agent.write_scope(),
            })
            .collect()
    }

    /// Run one session on a fresh blackboard.
    ///
    /// # Errors
    ///
    /// Only misuse is an error (for example a blackboard configuration without the
    /// `raw` space). A session that cannot commit reports `SessionStatus::Failed`.
    pub async fn process(&self, raw: &str) -> Result<SessionOutcome> {
        let blackboard =
            Arc::new(Blackboard::new(self.blackboard_config.clone()).with_bus(self.bus.clone()));
        self.process_in(blackboard, raw).await
    }

    /// Run one session against a caller-owned blackboard.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::process`].
    pub async fn process_in(&self, blackboard: Arc<Blackboard>, raw: &str) -> Result<SessionOutcome> {
        let mut session = Session::new(self, blackboard);
        info!(session_id = %session.id, agents = self.agents.len(), "Session started");
        session.observe();

        let applicable = session.route(raw)?;

        session.enter(SessionPhase::Dispatching)?;
        let returned = session.dispatch(applicable).await;

        session.enter(SessionPhase::Collecting)?;
        let proposals = session.collect(returned);

        session.enter(SessionPhase::Resolving)?;
        let resolution = session.resolve(proposals);

        session.enter(SessionPhase::Committing)?;
        let mut races = session.commit(resolution.winners);
        let mut raced: Vec<ConflictRecord> = Vec::new();

        if !races.is_empty() {
            warn!(
                session_id = %session.id,
                races = races.len(),
                "Commit raced a concurrent write, resolving again"
            );
            session.enter(SessionPhase::Resolving)?;
            let basis = session.board.clock();
            let (stale, records): (Vec<Proposal>, Vec<ConflictRecord>) = races.into_iter().unzip();
            raced = records;
            let refreshed = stale
                .into_iter()
                .map(|proposal| Proposal {
                    basis_clock: basis.clone(),
                    ..proposal
                })
                .collect();
            let retry = session.resolve(refreshed);

            session.enter(SessionPhase::Committing)?;
            races = session.commit(retry.winners);
        }

        if races.is_empty() {
            session.record_consolidated();
            session.enter(SessionPhase::Completed)?;
            Ok(session.finish(SessionStatus::Completed, &[]))
        } else {
            let failed_keys: Vec<String> = races.iter().map(|(p, _)| p.slot()).collect();
            // Both attempts' races, in commit order.
            session.conflicts.extend(raced);
            session
                .conflicts
                .extend(races.into_iter().map(|(_, record)| record));
            error!(session_id = %session.id, failed_keys = ?failed_keys, "Session failed after commit retry");
            session.enter(SessionPhase::Failed)?;
            Ok(session.finish(SessionStatus::Failed, &failed_keys))
        }
    }
}

type Returned = Vec<(Arc<dyn Agent>, Vec<Proposal>)>;

struct Session<'a> {
    orchestrator: &'a Orchestrator,
    id: SessionId,
    board: Arc<Blackboard>,
    machine: PhaseMachine,
    consolidated: BTreeMap<String, serde_json::Value>,
    conflicts: Vec<ConflictRecord>,
    incidents: Vec<Incident>,
}

impl<'a> Session<'a> {
    fn new(orchestrator: &'a Orchestrator, board: Arc<Blackboard>) -> Self {
        Self {
            orchestrator,
            id: SessionId::new(),
            board,
            machine: PhaseMachine::new(),
            consolidated: BTreeMap::new(),
            conflicts: Vec::new(),
            incidents: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SessionPhase) -> Result<()> {
        self.machine.advance(phase)?;
        self.observe();
        Ok(())
    }

    fn observe(&self) {
        let phase = self.machine.current();
        debug!(session_id = %self.id, phase = %phase, "Entered phase");
        self.orchestrator
            .observer
            .on_phase(&self.id, phase, &self.board);
    }

    fn incident(&mut self, incident: Incident) {
        warn!(session_id = %self.id, incident = ?incident, "Agent isolated");
        self.incidents.push(incident);
    }

    /// Store the requirement and pick the agents that can handle it.
    fn route(&mut self, raw: &str) -> Result<Vec<Arc<dyn Agent>>> {
        let me = AgentId::from(ORCHESTRATOR_AGENT);
        let scope = [RAW_SPACE, CONSOLIDATED_SPACE]
            .into_iter()
            .filter(|space| self.board.space_names().any(|name| name == *space));
        self.board.register_agent(&me, scope)?;

        let written = self.board.propose(
            &me,
            RAW_SPACE,
            REQUIREMENT_KEY,
            serde_json::json!(raw),
            &self.board.clock(),
        )?;
        if !written.is_committed() {
            warn!(session_id = %self.id, outcome = ?written, "Requirement not stored");
        }

        let orchestrator = self.orchestrator;
        let mut applicable = Vec::new();
        for agent in orchestrator.agents.iter().filter(|a| a.can_handle(raw)) {
            match self.board.register_agent(agent.id(), agent.write_scope()) {
                Ok(()) => applicable.push(Arc::clone(agent)),
                Err(e) => self.incident(Incident::AgentFailure {
                    agent: agent.id().clone(),
                    reason: e.to_string(),
                }),
            }
        }

        info!(
            session_id = %self.id,
            applicable = ?applicable.iter().map(|a| a.id().as_str()).collect::<Vec<_>>(),
            "Routed requirement"
        );
        Ok(applicable)
    }

    /// Run every agent's `propose` concurrently under one deadline.
    async fn dispatch(&mut self, agents: Vec<Arc<dyn Agent>>) -> Returned {
        let basis = self.board.clock();
        let deadline = Instant::now() + self.orchestrator.config.dispatch_deadline();

        let running = agents.into_iter().map(|agent| {
            let view = self.board.view(agent.id(), basis.clone());
            let task = Arc::clone(&agent);
            let mut handle = tokio::spawn(async move { task.propose(view).await });
            async move {
                let result = timeout_at(deadline, &mut handle).await;
                if result.is_err() {
                    handle.abort();
                }
                (agent, result)
            }
        });
        let finished = join_all(running).await;

        let mut returned = Vec::new();
        for (agent, result) in finished {
            let id = agent.id().clone();
            match result {
                Ok(Ok(Ok(proposals))) => {
                    debug!(session_id = %self.id, agent_id = %id, proposals = proposals.len(), "Agent proposed");
                    returned.push((agent, proposals));
                }
                Ok(Ok(Err(e))) => self.incident(Incident::AgentFailure {
                    agent: id,
                    reason: e.to_string(),
                }),
                Ok(Err(join)) => self.incident(Incident::AgentFailure {
                    agent: id,
                    reason: join.to_string(),
                }),
                Err(_) => self.incident(Incident::AgentTimeout { agent: id }),
            }
        }
        returned
    }

    /// Stamp proposals with their agent's identity and drop writes outside its scope.
    fn collect(&mut self, returned: Returned) -> Vec<Proposal> {
        let mut accepted = Vec::new();
        for (agent, proposals) in returned {
            for proposal in proposals {
                let proposal = Proposal {
                    agent_id: agent.id().clone(),
                    authority: agent.authority(),
                    ..proposal
                };
                if self.board.can_write(&proposal.agent_id, &proposal.target_space) {
                    accepted.push(proposal);
                } else {
                    self.incident(Incident::PermissionDenied {
                        agent: proposal.agent_id,
                        space: proposal.target_space,
                        key: proposal.key,
                    });
                }
            }
        }
        accepted
    }

    /// Apply the authority protocol and notify vetoed agents.
    fn resolve(&mut self, proposals: Vec<Proposal>) -> Resolution {
        let resolution = resolve(proposals, &self.orchestrator.ranking);

        for record in &resolution.conflicts {
            debug!(
                session_id = %self.id,
                space = %record.space,
                key = %record.key,
                winner = ?record.winner,
                reason = ?record.reason,
                "Resolved competing proposals"
            );
            if !matches!(record.reason, ConflictReason::Vetoed { .. }) {
                continue;
            }
            for loser in record
                .competing
                .iter()
                .filter(|p| record.winner.as_ref() != Some(&p.agent_id))
            {
                if let Some(agent) = self.agent(&loser.agent_id) {
                    agent.on_veto(loser, record);
                }
            }
        }

        self.conflicts.extend(resolution.conflicts.iter().cloned());
        resolution
    }

    /// Commit winners; returns the ones that raced a concurrent write.
    fn commit(&mut self, winners: Vec<Proposal>) -> Vec<(Proposal, ConflictRecord)> {
        let mut races = Vec::new();
        for winner in winners {
            match self.board.submit(&winner) {
                Ok(WriteOutcome::Committed { .. }) => {
                    self.consolidated.insert(winner.slot(), winner.value.clone());
                }
                Ok(WriteOutcome::Conflict { record }) => races.push((winner, record)),
                Ok(WriteOutcome::PermissionDenied) => self.incident(Incident::PermissionDenied {
                    agent: winner.agent_id,
                    space: winner.target_space,
                    key: winner.key,
                }),
                Err(e) => self.incident(Incident::AgentFailure {
                    agent: winner.agent_id,
                    reason: e.to_string(),
                }),
            }
        }
        races
    }

    /// Keep the merged map in the `consolidated` space, when the blackboard has one.
    fn record_consolidated(&self) {
        let me = AgentId::from(ORCHESTRATOR_AGENT);
        if !self.board.can_write(&me, CONSOLIDATED_SPACE) {
            return;
        }
        let written = self
            .board
            .propose(
                &me,
                CONSOLIDATED_SPACE,
                &self.id.to_string(),
                serde_json::json!(self.consolidated),
                &self.board.clock(),
            )
            .into_option_logged("Consolidated map not stored");
        if let Some(outcome) = written.filter(|o| !o.is_committed()) {
            warn!(session_id = %self.id, outcome = ?outcome, "Consolidated map not stored");
        }
    }

    fn agent(&self, id: &AgentId) -> Option<&Arc<dyn Agent>> {
        self.orchestrator.agents.iter().find(|a| a.id() == id)
    }

    fn finish(self, status: SessionStatus, failed_keys: &[String]) -> SessionOutcome {
        let (topic, payload) = match status {
            SessionStatus::Completed => (
                topics::REQUIREMENT_CONSOLIDATED,
                serde_json::json!({
                    "session_id": self.id.to_string(),
                    "consolidated": self.consolidated,
                    "conflicts": self.conflicts,
                }),
            ),
            SessionStatus::Failed => (
                topics::REQUIREMENT_FAILED,
                serde_json::json!({
                    "session_id": self.id.to_string(),
                    "conflicts": self.conflicts,
                    "failed_keys": failed_keys,
                }),
            ),
        };
        let receipt = self.orchestrator.bus.publish_message(
            Message::new(topic, payload)
                .with_priority(Priority::High)
                .from_producer(ORCHESTRATOR_AGENT)
                .with_correlation(self.id.to_string()),
        );

        info!(
            session_id = %self.id,
            status = ?status,
            consolidated = self.consolidated.len(),
            conflicts = self.conflicts.len(),
            incidents = self.incidents.len(),
            delivered_to = receipt.delivered_to.len(),
            "Session finished"
        );

        SessionOutcome {
            session_id: self.id,
            status,
            consolidated: self.consolidated,
            conflicts: self.conflicts,
            incidents: self.incidents,
            phases: self.machine.history().to_vec(),
            blackboard: self.board,
        }
    }
}
