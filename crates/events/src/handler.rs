//! Subscriber handlers.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// Failure reported by a handler. Only the subscriber's breaker ever sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed: {reason}")]
pub struct HandlerError {
    pub reason: String,
}

impl HandlerError {
    /// Create a handler error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result returned by a handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Receives messages delivered to a subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    async fn handle(&self, message: Arc<Message>) -> HandlerResult;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, message: Arc<Message>) -> HandlerResult {
        (self.func)(message).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        func,
        _marker: PhantomData,
    })
}
