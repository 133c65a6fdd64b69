//! Vector clocks for causal conflict detection.
//!
//! Clocks are immutable values: every operation returns a new clock. They are backed by a
//! persistent ordered map, so snapshots handed to agents share structure with the
//! blackboard's own copy.

use std::cmp::Ordering;

use concord_core::AgentId;
use im::OrdMap;
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Deserializer, Serialize};

/// Causal relation between two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockOrdering {
    /// Every counter ≤ the other's, at least one strictly less.
    Before,
    /// Every counter ≥ the other's, at least one strictly greater.
    After,
    /// Neither dominates.
    Concurrent,
    /// All counters match.
    Equal,
}

impl ClockOrdering {
    /// The relation seen from the other side.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }
}

/// Per-agent causal counters. Missing agents count as zero; zero counters are never
/// stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: OrdMap<AgentId, u64>,
}

impl VectorClock {
    /// Empty clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `agent`, zero if absent.
    #[must_use]
    pub fn get(&self, agent: &AgentId) -> u64 {
        self.counters.get(agent).copied().unwrap_or(0)
    }

    /// New clock with `agent`'s counter raised by one.
    #[must_use]
    pub fn increment(&self, agent: &AgentId) -> Self {
        let next = self.get(agent).saturating_add(1);
        Self {
            counters: self.counters.update(agent.clone(), next),
        }
    }

    /// Pointwise maximum over the union of agents.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let counters = self
            .counters
            .iter()
            .merge_join_by(other.counters.iter(), |(a, _), (b, _)| a.cmp(b))
            .map(|pair| match pair {
                EitherOrBoth::Both((agent, a), (_, b)) => (agent.clone(), *a.max(b)),
                EitherOrBoth::Left((agent, n)) | EitherOrBoth::Right((agent, n)) => {
                    (agent.clone(), *n)
                }
            })
            .collect();
        Self { counters }
    }

    /// Compare two clocks.
    #[must_use]
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let (less, greater) = self
            .counters
            .iter()
            .merge_join_by(other.counters.iter(), |(a, _), (b, _)| a.cmp(b))
            .map(|pair| match pair {
                EitherOrBoth::Both((_, a), (_, b)) => a.cmp(b),
                EitherOrBoth::Left((_, a)) => a.cmp(&0),
                EitherOrBoth::Right((_, b)) => 0.cmp(b),
            })
            .fold((false, false), |(less, greater), ord| match ord {
                Ordering::Less => (true, greater),
                Ordering::Greater => (less, true),
                Ordering::Equal => (less, greater),
            });

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Strictly after `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::After
    }

    /// Neither clock dominates the other.
    #[must_use]
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Non-zero counters in agent order.
    pub fn entries(&self) -> impl Iterator<Item = (&AgentId, u64)> {
        self.counters
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(agent, n)| (agent, *n))
    }

    /// Number of agents with a counter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl FromIterator<(AgentId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (AgentId, u64)>>(iter: I) -> Self {
        Self {
            counters: iter.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for VectorClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let counters = OrdMap::<AgentId, u64>::deserialize(deserializer)?;
        Ok(counters.into_iter().collect())
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self
            .entries()
            .map(|(agent, n)| format!("{agent}:{n}"))
            .join(", ");
        write!(f, "{{{body}}}")
    }
}

/// Index pairs `(i, j)`, `i < j`, of mutually concurrent clocks.
#[must_use]
pub fn detect_conflicts(clocks: &[VectorClock]) -> Vec<(usize, usize)> {
    clocks
        .iter()
        .enumerate()
        .tuple_combinations()
        .filter(|((_, a), (_, b))| a.is_concurrent(b))
        .map(|((i, _), (j, _))| (i, j))
        .collect()
}
