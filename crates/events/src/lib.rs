//! Priority publish/subscribe with per-subscriber circuit breaking.
//!
//! - **Messages**: ephemeral, prioritised, consumed once per subscriber
//! - **Message bus**: topic-pattern subscriptions, each drained by its own worker
//! - **Circuit breakers**: one per `(subscriber, pattern)`, isolating failing handlers
//!
//! # Example
//!
//! ```ignore
//! use concord_events::{handler_fn, topics, MessageBus, Priority};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::default();
//!     bus.subscribe("audit", "requirement.*", handler_fn(|msg| async move {
//!         println!("{}", msg.topic);
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//!     bus.publish(topics::REQUIREMENT_CONSOLIDATED, serde_json::json!({}), Priority::High);
//!     bus.quiesce().await;
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod breaker;
pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
mod mailbox;
pub mod message;

pub use breaker::{Admission, BreakerPhase, CircuitBreaker, CircuitBreakerState, DeliveryResult};
pub use bus::{MessageBus, PublishReceipt, SubscriptionId};
pub use config::BusConfig;
pub use error::{Error, Result};
pub use handler::{handler_fn, FnHandler, HandlerError, HandlerResult, MessageHandler};
pub use message::{topics, Message, MessageId, Priority, TopicPattern};
