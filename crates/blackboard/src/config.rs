//! Blackboard configuration.

use std::collections::HashSet;

use concord_core::Error;
use serde::{Deserialize, Serialize};

/// Knowledge spaces every session starts with unless configured otherwise.
pub const DEFAULT_SPACES: [&str; 4] = ["raw", "processed", "validated", "consolidated"];

/// Space holding the unprocessed input of a session.
pub const RAW_SPACE: &str = "raw";

/// What `propose` does when the candidate clock equals the stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualClockPolicy {
    /// Report a commit without touching the stored entry.
    #[default]
    #[serde(alias = "idempotent_no_op")]
    Idempotent,
    /// Treat it like any other race.
    Conflict,
}

/// Configuration for a blackboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackboardConfig {
    #[serde(default = "default_spaces")]
    pub knowledge_spaces: Vec<String>,

    #[serde(default)]
    pub equal_clock_policy: EqualClockPolicy,
}

impl Default for BlackboardConfig {
    fn default() -> Self {
        Self {
            knowledge_spaces: default_spaces(),
            equal_clock_policy: EqualClockPolicy::default(),
        }
    }
}

impl BlackboardConfig {
    /// Replace the knowledge spaces.
    #[must_use]
    pub fn with_spaces<I, S>(mut self, spaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knowledge_spaces = spaces.into_iter().map(Into::into).collect();
        self
    }

    /// Set the equal-clock policy.
    #[must_use]
    pub const fn with_equal_clock_policy(mut self, policy: EqualClockPolicy) -> Self {
        self.equal_clock_policy = policy;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty, blank or duplicated space list, or one
    /// without the `raw` space sessions store their requirement in.
    pub fn validate(&self) -> concord_core::Result<()> {
        if self.knowledge_spaces.is_empty() {
            return Err(Error::invalid_config(
                "blackboard.knowledge_spaces",
                "at least one knowledge space is required",
            ));
        }
        if self.knowledge_spaces.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::invalid_config(
                "blackboard.knowledge_spaces",
                "space names must not be blank",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.knowledge_spaces.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(Error::invalid_config(
                "blackboard.knowledge_spaces",
                format!("duplicate space '{dup}'"),
            ));
        }
        if !self.knowledge_spaces.iter().any(|s| s == RAW_SPACE) {
            return Err(Error::invalid_config(
                "blackboard.knowledge_spaces",
                format!("the '{RAW_SPACE}' space is required"),
            ));
        }
        Ok(())
    }
}

fn default_spaces() -> Vec<String> {
    DEFAULT_SPACES.iter().map(ToString::to_string).collect()
}
