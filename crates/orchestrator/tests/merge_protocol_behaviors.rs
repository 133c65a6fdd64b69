//! BDD-style behavioral tests for the orchestration session.
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>
//!
//! Agents here are scripted: each one proposes a fixed set of writes against the
//! dispatch snapshot, or stalls, fails or panics on demand.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use concord_blackboard::{Blackboard, BlackboardView, RAW_SPACE, REQUIREMENT_KEY};
use concord_core::{AgentId, SessionId};
use concord_events::{handler_fn, topics, MessageBus};
use orchestrator::{
    Agent, AuthorityLevel, ConflictReason, ConflictRecord, Error, Incident, Orchestrator,
    OrchestratorConfig, PhaseObserver, Proposal, SessionPhase, SessionStatus,
};

const REQUIREMENT: &str = "Configure the controller";

#[derive(Clone, Copy)]
enum Behavior {
    Propose,
    Stall,
    Fail,
    Panic,
}

struct ScriptedAgent {
    id: AgentId,
    authority: AuthorityLevel,
    handles: bool,
    behavior: Behavior,
    writes: Vec<(&'static str, &'static str, Value)>,
    vetoed: Mutex<Vec<Proposal>>,
}

impl ScriptedAgent {
    fn new(id: &str, authority: AuthorityLevel) -> Self {
        Self {
            id: AgentId::from(id),
            authority,
            handles: true,
            behavior: Behavior::Propose,
            writes: Vec::new(),
            vetoed: Mutex::new(Vec::new()),
        }
    }

    fn writes(mut self, space: &'static str, key: &'static str, value: Value) -> Self {
        self.writes.push((space, key, value));
        self
    }

    fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn declining(mut self) -> Self {
        self.handles = false;
        self
    }

    fn vetoes(&self) -> usize {
        self.vetoed.lock().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn authority(&self) -> AuthorityLevel {
        self.authority
    }

    fn can_handle(&self, _requirement: &str) -> bool {
        self.handles
    }

    async fn propose(&self, view: BlackboardView) -> orchestrator::Result<Vec<Proposal>> {
        match self.behavior {
            Behavior::Propose => Ok(self
                .writes
                .iter()
                .map(|(space, key, value)| {
                    Proposal::new(
                        self.id.clone(),
                        self.authority,
                        *space,
                        *key,
                        value.clone(),
                        view.basis().clone(),
                    )
                })
                .collect()),
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behavior::Fail => Err(Error::agent_failed(&self.id, "catalog unavailable")),
            Behavior::Panic => panic!("scripted agent blew up"),
        }
    }

    fn on_veto(&self, vetoed: &Proposal, _record: &ConflictRecord) {
        self.vetoed.lock().push(vetoed.clone());
    }
}

/// Writes `processed/K` from outside the session on the first `races` commit attempts.
struct Intruder {
    id: AgentId,
    races: usize,
    commits_seen: AtomicUsize,
}

impl Intruder {
    fn racing(races: usize) -> Self {
        Self {
            id: AgentId::from("intruder"),
            races,
            commits_seen: AtomicUsize::new(0),
        }
    }
}

impl PhaseObserver for Intruder {
    fn on_phase(&self, _session: &SessionId, phase: SessionPhase, board: &Blackboard) {
        match phase {
            SessionPhase::Routing => {
                let _ = board.register_agent(&self.id, ["processed"]);
            }
            SessionPhase::Committing => {
                let seen = self.commits_seen.fetch_add(1, Ordering::SeqCst);
                if seen < self.races {
                    let _ = board.propose(
                        &self.id,
                        "processed",
                        "K",
                        json!(format!("intruder-{seen}")),
                        &board.clock(),
                    );
                }
            }
            _ => {}
        }
    }
}

fn ids(records: &ConflictRecord) -> Vec<&str> {
    records.losers().map(AgentId::as_str).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTHORITY AND WEIGHT RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_primary_and_secondary_on_same_key_when_processed_then_primary_value_committed_and_secondary_vetoed() {
    // GIVEN: io_expert (Primary) and system_expert (Secondary) both write processed/K
    let io = Arc::new(
        ScriptedAgent::new("io_expert", AuthorityLevel::Primary).writes("processed", "K", json!("v1")),
    );
    let system = Arc::new(
        ScriptedAgent::new("system_expert", AuthorityLevel::Secondary)
            .writes("processed", "K", json!("v2")),
    );
    let orchestrator = Orchestrator::builder()
        .agent(io.clone())
        .agent(system.clone())
        .build()
        .unwrap();

    // WHEN: the requirement is processed
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: the Primary value wins and the Secondary agent is told about the veto
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!("v1")));
    assert_eq!(
        outcome.blackboard.read("processed", "K").map(|e| e.value),
        Some(json!("v1"))
    );

    assert_eq!(outcome.conflicts.len(), 1);
    let record = &outcome.conflicts[0];
    assert_eq!(
        record.reason,
        ConflictReason::Vetoed {
            by: AgentId::from("io_expert")
        }
    );
    assert_eq!(record.winner, Some(AgentId::from("io_expert")));
    assert_eq!(ids(record), vec!["system_expert"]);

    assert_eq!(system.vetoes(), 1);
    assert_eq!(io.vetoes(), 0);
}

#[tokio::test]
async fn given_two_secondaries_with_equal_weight_when_rerun_then_same_winner_every_time() {
    // GIVEN: two Secondary agents with the same configured weight
    let config = OrchestratorConfig::default()
        .with_agent_weight("alpha", 10)
        .with_agent_weight("beta", 10);

    let mut winners = Vec::new();
    for _ in 0..5 {
        let orchestrator = Orchestrator::builder()
            .config(config.clone())
            .agent(Arc::new(
                ScriptedAgent::new("alpha", AuthorityLevel::Secondary)
                    .writes("processed", "K", json!("from-alpha")),
            ))
            .agent(Arc::new(
                ScriptedAgent::new("beta", AuthorityLevel::Secondary)
                    .writes("processed", "K", json!("from-beta")),
            ))
            .build()
            .unwrap();

        // WHEN: the same requirement is processed again
        let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].reason, ConflictReason::RegistrationOrder);
        winners.push(outcome.consolidated.get("processed/K").cloned());
    }

    // THEN: registration order decides, identically on every run
    assert!(winners.iter().all(|w| *w == Some(json!("from-alpha"))));
}

#[tokio::test]
async fn given_secondaries_with_different_weights_when_processed_then_heavier_wins() {
    // GIVEN: a later-registered agent with more weight
    let config = OrchestratorConfig::default()
        .with_agent_weight("light", 5)
        .with_agent_weight("heavy", 50);
    let light = Arc::new(
        ScriptedAgent::new("light", AuthorityLevel::Secondary).writes("processed", "K", json!(1)),
    );
    let orchestrator = Orchestrator::builder()
        .config(config)
        .agent(light.clone())
        .agent(Arc::new(
            ScriptedAgent::new("heavy", AuthorityLevel::Secondary)
                .writes("processed", "K", json!(2)),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: weight beats registration order, and no veto is reported
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!(2)));
    assert_eq!(outcome.conflicts[0].reason, ConflictReason::OutrankedByWeight);
    assert_eq!(light.vetoes(), 0);
}

#[tokio::test]
async fn given_agents_writing_different_keys_when_processed_then_both_committed_without_conflicts() {
    // GIVEN
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("a", AuthorityLevel::Secondary).writes("processed", "A", json!(1)),
        ))
        .agent(Arc::new(
            ScriptedAgent::new("b", AuthorityLevel::Secondary).writes("validated", "B", json!(2)),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN
    assert!(outcome.is_completed());
    assert_eq!(outcome.consolidated.get("processed/A"), Some(&json!(1)));
    assert_eq!(outcome.consolidated.get("validated/B"), Some(&json!(2)));
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.incidents.is_empty());
}

#[tokio::test]
async fn given_same_key_in_two_spaces_when_processed_then_both_values_kept() {
    // GIVEN: two agents writing K, one in processed and one in validated
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("a", AuthorityLevel::Primary).writes("processed", "K", json!("draft")),
        ))
        .agent(Arc::new(
            ScriptedAgent::new("b", AuthorityLevel::Secondary)
                .writes("validated", "K", json!("checked")),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: neither value overwrites the other
    assert!(outcome.is_completed());
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.consolidated.len(), 2);
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!("draft")));
    assert_eq!(outcome.consolidated.get("validated/K"), Some(&json!("checked")));
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTING AND AGENT ISOLATION
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_no_agent_handles_requirement_when_processed_then_completed_with_empty_result() {
    // GIVEN
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("a", AuthorityLevel::Secondary)
                .writes("processed", "A", json!(1))
                .declining(),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: the requirement is still stored under raw
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome.consolidated.is_empty());
    assert!(outcome.conflicts.is_empty());
    assert_eq!(outcome.blackboard.requirement().as_deref(), Some(REQUIREMENT));
    assert_eq!(
        outcome.phases,
        vec![
            SessionPhase::Routing,
            SessionPhase::Dispatching,
            SessionPhase::Collecting,
            SessionPhase::Resolving,
            SessionPhase::Committing,
            SessionPhase::Completed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn given_agent_exceeding_deadline_when_processed_then_it_abstains_and_others_commit() {
    // GIVEN: one agent that never returns and a 100ms dispatch deadline
    let config = OrchestratorConfig::default().with_dispatch_deadline(Duration::from_millis(100));
    let orchestrator = Orchestrator::builder()
        .config(config)
        .agent(Arc::new(
            ScriptedAgent::new("slow", AuthorityLevel::Primary)
                .writes("processed", "K", json!("slow"))
                .behaving(Behavior::Stall),
        ))
        .agent(Arc::new(
            ScriptedAgent::new("fast", AuthorityLevel::Secondary)
                .writes("processed", "K", json!("fast")),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: the slow agent is a timeout incident, not a participant
    assert!(outcome.is_completed());
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!("fast")));
    assert!(outcome.conflicts.is_empty());
    assert_eq!(
        outcome.incidents,
        vec![Incident::AgentTimeout {
            agent: AgentId::from("slow")
        }]
    );
}

#[tokio::test]
async fn given_failing_and_panicking_agents_when_processed_then_both_isolated() {
    // GIVEN
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("broken", AuthorityLevel::Primary).behaving(Behavior::Fail),
        ))
        .agent(Arc::new(
            ScriptedAgent::new("crashing", AuthorityLevel::Primary).behaving(Behavior::Panic),
        ))
        .agent(Arc::new(
            ScriptedAgent::new("healthy", AuthorityLevel::Secondary)
                .writes("processed", "K", json!(7)),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN
    assert!(outcome.is_completed());
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!(7)));
    let failed: Vec<&str> = outcome
        .incidents
        .iter()
        .filter_map(|incident| match incident {
            Incident::AgentFailure { agent, .. } => Some(agent.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec!["broken", "crashing"]);
}

#[tokio::test]
async fn given_proposal_outside_write_scope_when_processed_then_permission_denied_and_raw_untouched() {
    // GIVEN: an agent that tries to overwrite the raw requirement
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("rogue", AuthorityLevel::Primary)
                .writes(RAW_SPACE, REQUIREMENT_KEY, json!("something else"))
                .writes("processed", "K", json!(true)),
        ))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: only the in-scope write lands
    assert!(outcome.is_completed());
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!(true)));
    assert_eq!(outcome.blackboard.requirement().as_deref(), Some(REQUIREMENT));
    assert_eq!(
        outcome.incidents,
        vec![Incident::PermissionDenied {
            agent: AgentId::from("rogue"),
            space: RAW_SPACE.to_string(),
            key: REQUIREMENT_KEY.to_string(),
        }]
    );
}

#[test]
fn given_two_agents_with_same_id_when_building_then_duplicate_agent_error() {
    // GIVEN / WHEN
    let result = Orchestrator::builder()
        .agent(Arc::new(ScriptedAgent::new("twin", AuthorityLevel::Primary)))
        .agent(Arc::new(ScriptedAgent::new("twin", AuthorityLevel::Secondary)))
        .build();

    // THEN
    assert!(matches!(result, Err(Error::DuplicateAgent { agent }) if agent.as_str() == "twin"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMIT RACES
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_one_concurrent_write_during_commit_when_processed_then_retry_commits() {
    // GIVEN: an outside writer touches processed/K just before the first commit
    let orchestrator = Orchestrator::builder()
        .agent(Arc::new(
            ScriptedAgent::new("writer", AuthorityLevel::Primary)
                .writes("processed", "K", json!("session")),
        ))
        .observer(Arc::new(Intruder::racing(1)))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();

    // THEN: one Resolving/Committing round trip, then the session's value lands
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.consolidated.get("processed/K"), Some(&json!("session")));
    assert_eq!(
        outcome.blackboard.read("processed", "K").map(|e| e.value),
        Some(json!("session"))
    );
    assert_eq!(
        outcome.phases,
        vec![
            SessionPhase::Routing,
            SessionPhase::Dispatching,
            SessionPhase::Collecting,
            SessionPhase::Resolving,
            SessionPhase::Committing,
            SessionPhase::Resolving,
            SessionPhase::Committing,
            SessionPhase::Completed,
        ]
    );
    assert!(outcome
        .blackboard
        .conflicts()
        .iter()
        .any(|record| record.reason == ConflictReason::StaleBasis));
}

#[tokio::test]
async fn given_concurrent_writes_on_both_commit_attempts_when_processed_then_session_fails() {
    // GIVEN: an outside writer that wins both commit attempts
    let bus = MessageBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "observer",
        "requirement.*",
        handler_fn(move |message| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push((message.topic.clone(), message.payload.clone()));
                Ok(())
            }
        }),
    )
    .unwrap();

    let orchestrator = Orchestrator::builder()
        .bus(bus.clone())
        .agent(Arc::new(
            ScriptedAgent::new("writer", AuthorityLevel::Primary)
                .writes("processed", "K", json!("session")),
        ))
        .observer(Arc::new(Intruder::racing(2)))
        .build()
        .unwrap();

    // WHEN
    let outcome = orchestrator.process(REQUIREMENT).await.unwrap();
    bus.quiesce().await;

    // THEN: nothing from the session is committed for K
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.phases.last(), Some(&SessionPhase::Failed));
    assert!(outcome.consolidated.get("processed/K").is_none());
    assert_eq!(
        outcome.blackboard.read("processed", "K").map(|e| e.value),
        Some(json!("intruder-1"))
    );
    let races = outcome
        .conflicts
        .iter()
        .filter(|r| r.reason.is_commit_race())
        .count();
    assert_eq!(races, 2, "both commit attempts are reported");

    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, topics::REQUIREMENT_FAILED);
    assert_eq!(events[0].1["failed_keys"], json!(["processed/K"]));
    assert_eq!(events[0].1["conflicts"].as_array().map(Vec::len), Some(2));
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT EXPERTS END TO END
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn given_default_experts_when_processing_plc_requirement_then_io_expert_overrides_protocol() {
    // GIVEN
    let orchestrator = Orchestrator::with_default_experts().unwrap();
    let events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&events);
    orchestrator
        .bus()
        .subscribe(
            "observer",
            topics::REQUIREMENT_CONSOLIDATED,
            handler_fn(move |_message| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();

    // WHEN
    let outcome = orchestrator
        .process(
            "We need 16 digital inputs and 8 analog outputs over Modbus RTU on an RS-485 port. \
             The processor needs 512 MB of RAM.",
        )
        .await
        .unwrap();
    orchestrator.bus().quiesce().await;

    // THEN
    assert!(outcome.is_completed());
    assert_eq!(outcome.consolidated.get("processed/io.digital_inputs"), Some(&json!(16)));
    assert_eq!(outcome.consolidated.get("processed/io.analog_outputs"), Some(&json!(8)));
    assert_eq!(outcome.consolidated.get("processed/system.memory_mb"), Some(&json!(512)));
    assert_eq!(
        outcome.consolidated.get("processed/communication.protocol"),
        Some(&json!(["modbus_rtu"]))
    );
    assert_eq!(
        outcome.consolidated.get("processed/communication.interface"),
        Some(&json!(["rs485"]))
    );

    let protocol = outcome
        .conflicts
        .iter()
        .find(|r| r.key == "communication.protocol")
        .unwrap();
    assert_eq!(
        protocol.reason,
        ConflictReason::Vetoed {
            by: AgentId::from("io_expert")
        }
    );
    assert_eq!(ids(protocol), vec!["communication_expert"]);
    assert_eq!(events.load(Ordering::SeqCst), 1);
}
