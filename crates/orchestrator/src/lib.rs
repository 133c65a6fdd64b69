//! # Orchestrator
//!
//! Expert agents and the session protocol that merges their proposals on a shared
//! blackboard.
//!
//! A session moves through `Routing -> Dispatching -> Collecting -> Resolving ->
//! Committing` and ends `Completed` or `Failed`:
//!
//! - agents whose `can_handle` accepts the requirement run concurrently under one deadline
//! - competing proposals for a key are settled by authority (Primary vetoes Secondary),
//!   then weight, then registration order
//! - winners are committed optimistically; a commit race gets exactly one re-resolve
//!
//! # Example
//!
//! ```ignore
//! use orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> orchestrator::Result<()> {
//!     let orchestrator = Orchestrator::with_default_experts()?;
//!     let outcome = orchestrator
//!         .process("16 digital inputs over Modbus RTU on an RS-485 port.")
//!         .await?;
//!     println!("{:?}: {:?}", outcome.status, outcome.consolidated);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod agent;
pub mod authority;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod experts;
pub mod observer;
#[allow(clippy::module_inception)]
pub mod orchestrator;
pub mod session;

pub use agent::{Agent, DEFAULT_WRITE_SCOPE};
pub use authority::{resolve, Ranking, Resolution};
pub use collaborators::{
    CompatibilityChecker, CompatibilityReport, Constraint, ConstraintCategory, ConstraintValue,
    DataQuery, JsonDataQuery, ParsedRequirement, PatternRequirementParser, RequirementParser,
    RuleCompatibilityChecker, Toolkit, Violation, ViolationKind,
};
pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use experts::{default_experts, CommunicationExpert, IoExpert, SystemExpert};
pub use observer::{NoopObserver, PhaseObserver};
pub use orchestrator::{
    AgentSummary, Orchestrator, OrchestratorBuilder, CONSOLIDATED_SPACE, ORCHESTRATOR_AGENT,
};
pub use session::{Incident, PhaseMachine, SessionOutcome, SessionPhase, SessionStatus};

pub use concord_blackboard::{AuthorityLevel, ConflictReason, ConflictRecord, Proposal};
