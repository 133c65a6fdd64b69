//! Error types for the events crate.

use thiserror::Error;

use crate::bus::SubscriptionId;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bus error types.
///
/// Handler failures never surface here: they are contained by the subscriber's
/// circuit breaker and only show up in logs and breaker state.
#[derive(Debug, Error)]
pub enum Error {
    /// No subscription with this id is registered.
    #[error("subscription '{0}' not found")]
    SubscriptionNotFound(SubscriptionId),

    /// Subscriptions spawn a worker task and need a Tokio runtime.
    #[error("no tokio runtime available to run subscriber '{subscriber}'")]
    NoRuntime { subscriber: String },

    /// Configuration or other core failure.
    #[error(transparent)]
    Core(#[from] concord_core::Error),
}
