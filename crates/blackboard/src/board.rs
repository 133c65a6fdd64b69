//! The blackboard: partitioned shared memory with optimistic, conflict-detecting writes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use concord_core::AgentId;
use concord_events::{topics, MessageBus, Priority};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{ClockOrdering, VectorClock};
use crate::config::{BlackboardConfig, EqualClockPolicy, RAW_SPACE};
use crate::error::{Error, Result};
use crate::proposal::{AuthorityLevel, ConflictReason, ConflictRecord, Proposal};
use crate::space::{AgentSpace, KnowledgeSpace, VersionedEntry};
use crate::view::BlackboardView;

/// Key under which the orchestrator stores a session's raw input.
pub const REQUIREMENT_KEY: &str = "requirement";

/// Outcome of a write attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Stored (or accepted as an idempotent no-op) with this clock.
    Committed { clock: VectorClock },
    /// Not stored; resolution is up to the caller.
    Conflict { record: ConflictRecord },
    /// The agent has no write scope for the space.
    PermissionDenied,
}

impl WriteOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Result of comparing a candidate clock to the stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    Commit,
    /// Equal clocks under the idempotent policy: report success, keep the entry.
    NoOp,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    StaleBasis,
    Concurrent,
    Equal,
}

impl From<RejectReason> for ConflictReason {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::StaleBasis => Self::StaleBasis,
            RejectReason::Concurrent => Self::ConcurrentWrite,
            RejectReason::Equal => Self::EqualClock,
        }
    }
}

/// Decide a write. The blackboard never picks a winner between racing writers: anything
/// but a strictly newer candidate is rejected back to the caller.
#[must_use]
pub fn decide(
    basis: &VectorClock,
    candidate: &VectorClock,
    stored: Option<&VectorClock>,
    policy: EqualClockPolicy,
) -> CommitDecision {
    let Some(stored) = stored else {
        return CommitDecision::Commit;
    };

    if basis.compare(stored) == ClockOrdering::Before {
        return CommitDecision::Reject(RejectReason::StaleBasis);
    }

    match candidate.compare(stored) {
        ClockOrdering::After => CommitDecision::Commit,
        ClockOrdering::Equal => match policy {
            EqualClockPolicy::Idempotent => CommitDecision::NoOp,
            EqualClockPolicy::Conflict => CommitDecision::Reject(RejectReason::Equal),
        },
        ClockOrdering::Before => CommitDecision::Reject(RejectReason::StaleBasis),
        ClockOrdering::Concurrent => CommitDecision::Reject(RejectReason::Concurrent),
    }
}

/// Every knowledge space, ordered by name then key.
pub type BlackboardSnapshot = BTreeMap<String, BTreeMap<String, VersionedEntry>>;

/// Shared memory for one session.
#[derive(Debug)]
pub struct Blackboard {
    config: BlackboardConfig,
    /// Fixed at construction; only the spaces' contents change.
    spaces: HashMap<String, KnowledgeSpace>,
    scopes: DashMap<AgentId, BTreeSet<String>>,
    local_clocks: DashMap<AgentId, VectorClock>,
    agent_spaces: DashMap<AgentId, Arc<AgentSpace>>,
    conflicts: Mutex<Vec<ConflictRecord>>,
    bus: Option<MessageBus>,
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new(BlackboardConfig::default())
    }
}

impl Blackboard {
    /// Create a blackboard with the configured knowledge spaces.
    #[must_use]
    pub fn new(config: BlackboardConfig) -> Self {
        let spaces = config
            .knowledge_spaces
            .iter()
            .map(|name| (name.clone(), KnowledgeSpace::new(name.clone())))
            .collect();
        Self {
            config,
            spaces,
            scopes: DashMap::new(),
            local_clocks: DashMap::new(),
            agent_spaces: DashMap::new(),
            conflicts: Mutex::new(Vec::new()),
            bus: None,
        }
    }

    /// Publish `entry.updated` on `bus` for every committed overwrite.
    #[must_use]
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &BlackboardConfig {
        &self.config
    }

    /// Knowledge space names in configuration order.
    pub fn space_names(&self) -> impl Iterator<Item = &str> {
        self.config.knowledge_spaces.iter().map(String::as_str)
    }

    /// Declare the spaces `agent` may write. Replaces any earlier declaration.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSpace` if the scope names a space this blackboard lacks.
    pub fn register_agent<I, S>(&self, agent: &AgentId, scope: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope: BTreeSet<String> = scope.into_iter().map(Into::into).collect();
        if let Some(unknown) = scope.iter().find(|space| !self.spaces.contains_key(*space)) {
            return Err(Error::unknown_space(unknown.clone()));
        }
        debug!(agent_id = %agent, scope = ?scope, "Registered agent write scope");
        self.scopes.insert(agent.clone(), scope);
        Ok(())
    }

    /// Whether `agent` declared write scope for `space`.
    #[must_use]
    pub fn can_write(&self, agent: &AgentId, space: &str) -> bool {
        self.scopes
            .get(agent)
            .is_some_and(|scope| scope.contains(space))
    }

    /// Current entry for `key` in `space`.
    #[must_use]
    pub fn read(&self, space: &str, key: &str) -> Option<VersionedEntry> {
        self.spaces.get(space).and_then(|s| s.get(key))
    }

    /// Snapshot of one knowledge space.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSpace` for a space this blackboard lacks.
    pub fn entries(&self, space: &str) -> Result<BTreeMap<String, VersionedEntry>> {
        self.space(space).map(KnowledgeSpace::snapshot)
    }

    /// Snapshot of every knowledge space.
    #[must_use]
    pub fn snapshot(&self) -> BlackboardSnapshot {
        self.spaces
            .iter()
            .map(|(name, space)| (name.clone(), space.snapshot()))
            .collect()
    }

    /// Merge of every committed entry clock.
    #[must_use]
    pub fn clock(&self) -> VectorClock {
        self.spaces
            .values()
            .fold(VectorClock::new(), |acc, space| acc.merge(&space.clock()))
    }

    /// Every conflict this blackboard has reported, oldest first.
    #[must_use]
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.lock().clone()
    }

    /// The raw input stored by the orchestrator.
    #[must_use]
    pub fn requirement(&self) -> Option<String> {
        self.read(RAW_SPACE, REQUIREMENT_KEY)
            .and_then(|entry| entry.value.as_str().map(ToString::to_string))
    }

    /// Private scratch space of `agent`.
    pub(crate) fn agent_space(&self, agent: &AgentId) -> Arc<AgentSpace> {
        Arc::clone(
            self.agent_spaces
                .entry(agent.clone())
                .or_default()
                .value(),
        )
    }

    /// Read-only view for one agent, pinned to `basis`.
    #[must_use]
    pub fn view(self: &Arc<Self>, agent: &AgentId, basis: VectorClock) -> BlackboardView {
        BlackboardView::new(Arc::clone(self), agent.clone(), basis)
    }

    /// Submit a proposal.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSpace` if the proposal targets a space this blackboard lacks.
    pub fn submit(&self, proposal: &Proposal) -> Result<WriteOutcome> {
        self.write(
            &proposal.agent_id,
            proposal.authority,
            &proposal.target_space,
            &proposal.key,
            proposal.value.clone(),
            &proposal.basis_clock,
        )
    }

    /// Attempt an optimistic write of `key` in `space`.
    ///
    /// The candidate clock is `merge(increment(local clock of agent), basis)`. It is
    /// committed only if it is strictly after the stored entry's clock; a concurrent or
    /// older candidate comes back as `Conflict` and nothing is mutated.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSpace` if `space` does not exist.
    pub fn propose(
        &self,
        agent: &AgentId,
        space: &str,
        key: &str,
        value: serde_json::Value,
        basis: &VectorClock,
    ) -> Result<WriteOutcome> {
        self.write(agent, AuthorityLevel::Secondary, space, key, value, basis)
    }

    fn write(
        &self,
        agent: &AgentId,
        authority: AuthorityLevel,
        space_name: &str,
        key: &str,
        value: serde_json::Value,
        basis: &VectorClock,
    ) -> Result<WriteOutcome> {
        let space = self.space(space_name)?;

        if !self.can_write(agent, space_name) {
            warn!(agent_id = %agent, space = space_name, key, "Write outside declared scope");
            return Ok(WriteOutcome::PermissionDenied);
        }

        let local = self
            .local_clocks
            .get(agent)
            .map(|clock| clock.value().clone())
            .unwrap_or_default();
        let candidate = local.increment(agent).merge(basis);
        let policy = self.config.equal_clock_policy;

        let decision = space.compare_and_commit(key, |stored| {
            let decision = decide(basis, &candidate, stored.map(|e| &e.clock), policy);
            let incumbent = stored.map(|e| e.writer_id.clone());
            let stored_clock = stored.map(|e| e.clock.clone());
            let replacement = (decision == CommitDecision::Commit).then(|| VersionedEntry {
                value: value.clone(),
                writer_id: agent.clone(),
                clock: candidate.clone(),
                timestamp: Utc::now(),
            });
            (replacement, (decision, incumbent, stored_clock))
        });

        match decision {
            (CommitDecision::Commit, _, _) => {
                self.local_clocks
                    .entry(agent.clone())
                    .and_modify(|clock| *clock = clock.merge(&candidate))
                    .or_insert_with(|| candidate.clone());
                debug!(agent_id = %agent, space = space_name, key, clock = %candidate, "Committed entry");
                self.announce(agent, space_name, key, &value, &candidate);
                Ok(WriteOutcome::Committed { clock: candidate })
            }
            (CommitDecision::NoOp, _, stored_clock) => {
                debug!(agent_id = %agent, space = space_name, key, "Equal clock, idempotent no-op");
                Ok(WriteOutcome::Committed {
                    clock: stored_clock.unwrap_or(candidate),
                })
            }
            (CommitDecision::Reject(reason), incumbent, stored_clock) => {
                let record = ConflictRecord {
                    space: space_name.to_string(),
                    key: key.to_string(),
                    competing: vec![Proposal::new(
                        agent.clone(),
                        authority,
                        space_name,
                        key,
                        value,
                        basis.clone(),
                    )],
                    winner: incumbent,
                    reason: reason.into(),
                };
                debug!(
                    agent_id = %agent,
                    space = space_name,
                    key,
                    basis = %basis,
                    stored = %stored_clock.unwrap_or_default(),
                    reason = ?reason,
                    "Write conflict"
                );
                self.conflicts.lock().push(record.clone());
                Ok(WriteOutcome::Conflict { record })
            }
        }
    }

    fn space(&self, name: &str) -> Result<&KnowledgeSpace> {
        self.spaces.get(name).ok_or_else(|| Error::unknown_space(name))
    }

    fn announce(
        &self,
        agent: &AgentId,
        space: &str,
        key: &str,
        value: &serde_json::Value,
        clock: &VectorClock,
    ) {
        let Some(bus) = &self.bus else {
            return;
        };
        bus.publish_message(
            concord_events::Message::new(
                topics::ENTRY_UPDATED,
                serde_json::json!({
                    "space": space,
                    "key": key,
                    "writer_id": agent,
                    "value": value,
                    "clock": clock,
                }),
            )
            .with_priority(Priority::Normal)
            .from_producer(agent.as_str()),
        );
    }
}
