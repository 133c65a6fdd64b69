//! Knowledge spaces and private agent spaces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use concord_core::AgentId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;

/// A committed value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedEntry {
    pub value: serde_json::Value,
    pub writer_id: AgentId,
    pub clock: VectorClock,
    pub timestamp: DateTime<Utc>,
}

/// Named partition of the blackboard holding `key -> VersionedEntry`.
///
/// Reads never block writers; a write holds only the key's shard for the
/// duration of its compare-and-commit.
#[derive(Debug)]
pub struct KnowledgeSpace {
    name: String,
    entries: DashMap<String, VersionedEntry>,
}

impl KnowledgeSpace {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<VersionedEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Copy of every entry, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, VersionedEntry> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge of every entry clock in this space.
    pub(crate) fn clock(&self) -> VectorClock {
        self.entries
            .iter()
            .fold(VectorClock::new(), |acc, entry| acc.merge(&entry.clock))
    }

    /// Run `decide` against the stored entry while holding the key, and store the
    /// entry it returns.
    pub(crate) fn compare_and_commit<T>(
        &self,
        key: &str,
        decide: impl FnOnce(Option<&VersionedEntry>) -> (Option<VersionedEntry>, T),
    ) -> T {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (replacement, outcome) = decide(Some(occupied.get()));
                if let Some(entry) = replacement {
                    occupied.insert(entry);
                }
                outcome
            }
            Entry::Vacant(vacant) => {
                let (replacement, outcome) = decide(None);
                if let Some(entry) = replacement {
                    vacant.insert(entry);
                }
                outcome
            }
        }
    }
}

/// Private scratch mapping of one agent. Only that agent's view hands it out.
#[derive(Debug, Default)]
pub struct AgentSpace {
    entries: DashMap<String, serde_json::Value>,
}

impl AgentSpace {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    /// Store a value, returning the previous one.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
