//! # concord-blackboard
//!
//! Partitioned shared memory for one processing session:
//!
//! - **Vector clocks**: per-agent causal counters with merge and comparison
//! - **Knowledge spaces**: named partitions of versioned entries
//! - **Agent spaces**: private per-agent scratch mappings
//! - **Optimistic writes**: `propose` commits only causally newer candidates and reports
//!   every race as a `ConflictRecord` instead of picking a winner

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod board;
pub mod clock;
pub mod config;
pub mod error;
pub mod proposal;
pub mod space;
pub mod view;

pub use board::{
    decide, Blackboard, BlackboardSnapshot, CommitDecision, RejectReason, WriteOutcome,
    REQUIREMENT_KEY,
};
pub use clock::{detect_conflicts, ClockOrdering, VectorClock};
pub use config::{BlackboardConfig, EqualClockPolicy, DEFAULT_SPACES, RAW_SPACE};
pub use error::{Error, Result};
pub use proposal::{AuthorityLevel, ConflictReason, ConflictRecord, Proposal};
pub use space::{AgentSpace, KnowledgeSpace, VersionedEntry};
pub use view::BlackboardView;
