//! Messages, priorities and topic patterns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Well-known topics published by the core.
pub mod topics {
    /// A blackboard entry was overwritten by a committed proposal.
    pub const ENTRY_UPDATED: &str = "entry.updated";
    /// A session completed and committed its merged result.
    pub const REQUIREMENT_CONSOLIDATED: &str = "requirement.consolidated";
    /// A session failed after an unrecoverable commit race.
    pub const REQUIREMENT_FAILED: &str = "requirement.failed";
}

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Ulid);

impl MessageId {
    /// Create a new random message ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery priority. Higher priorities are handled first by every subscriber.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// An ephemeral message, consumed once per subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub producer_id: String,
    /// Defaults to the message's own id.
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a normal-priority message with an anonymous producer.
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        let id = MessageId::new();
        Self {
            id,
            topic: topic.into(),
            payload,
            priority: Priority::Normal,
            producer_id: String::from("anonymous"),
            correlation_id: id.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the producer.
    #[must_use]
    pub fn from_producer(mut self, producer_id: impl Into<String>) -> Self {
        self.producer_id = producer_id.into();
        self
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// Which topics a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    /// Every topic (`*`).
    All,
    /// Topics starting with the prefix (`requirement.*` stores `requirement.`).
    Prefix(String),
    /// Exactly one topic.
    Exact(String),
}

impl TopicPattern {
    /// Check if a topic matches this pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => topic.starts_with(prefix.as_str()),
            Self::Exact(exact) => exact == topic,
        }
    }
}

impl From<&str> for TopicPattern {
    fn from(value: &str) -> Self {
        if value == "*" {
            Self::All
        } else if let Some(prefix) = value.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(value.to_string())
        }
    }
}

impl From<String> for TopicPattern {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_patterns_from_strings() {
        assert_eq!(TopicPattern::from("*"), TopicPattern::All);
        assert_eq!(
            TopicPattern::from("requirement.*"),
            TopicPattern::Prefix("requirement.".to_string())
        );
        assert_eq!(
            TopicPattern::from("entry.updated"),
            TopicPattern::Exact("entry.updated".to_string())
        );
    }

    #[test]
    fn should_match_topics_by_pattern() {
        let prefix = TopicPattern::from("requirement.*");
        assert!(prefix.matches(topics::REQUIREMENT_CONSOLIDATED));
        assert!(prefix.matches(topics::REQUIREMENT_FAILED));
        assert!(!prefix.matches(topics::ENTRY_UPDATED));

        let exact = TopicPattern::from(topics::ENTRY_UPDATED);
        assert!(exact.matches("entry.updated"));
        assert!(!exact.matches("entry.updated.more"));

        assert!(TopicPattern::All.matches("anything"));
    }

    #[test]
    fn should_round_trip_pattern_display() {
        for raw in ["*", "requirement.*", "entry.updated"] {
            assert_eq!(TopicPattern::from(raw).to_string(), raw);
        }
    }

    #[test]
    fn should_order_priorities() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn should_default_correlation_to_message_id() {
        let message = Message::new("t", serde_json::json!({}));
        assert_eq!(message.correlation_id, message.id.to_string());

        let correlated = message.with_correlation("session-1");
        assert_eq!(correlated.correlation_id, "session-1");
    }
}
