//! Message bus for publish/subscribe coordination.
//!
//! Every subscription owns a priority mailbox drained by its own worker task, so
//! `publish` only enqueues and never waits on a handler. Each handler invocation runs
//! behind the circuit breaker of its `(subscriber, pattern)` pair; breakers live on the
//! bus and outlast individual subscriptions.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::breaker::{Admission, BreakerPhase, CircuitBreaker, CircuitBreakerState, DeliveryResult};
use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::handler::MessageHandler;
use crate::mailbox::{Envelope, Mailbox, Pending};
use crate::message::{Message, MessageId, Priority, TopicPattern};

/// Handle returned by [`MessageBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Rebuild an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// Fan-out decisions for one published message.
///
/// Skips are informational only; publishing never fails because a subscriber is broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: MessageId,
    /// Subscribers the message was queued for, in subscription order.
    pub delivered_to: Vec<String>,
    /// Subscribers skipped because their breaker was open.
    pub skipped: Vec<String>,
}

type BreakerKey = (String, String);

struct Subscription {
    id: SubscriptionId,
    subscriber: String,
    pattern: TopicPattern,
    mailbox: Arc<Mailbox>,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl Subscription {
    fn close(&self, pending: &Pending) {
        let dropped = self.mailbox.close();
        if dropped.iter().any(|envelope| envelope.probe) {
            self.breaker.lock().abandon_probe(Instant::now());
        }
        pending.done_many(dropped.len());
    }
}

struct BusInner {
    config: BusConfig,
    /// Arrival order.
    subscriptions: RwLock<Vec<Subscription>>,
    breakers: Mutex<HashMap<BreakerKey, Arc<Mutex<CircuitBreaker>>>>,
    history: Mutex<VecDeque<Arc<Message>>>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        for sub in self.subscriptions.get_mut().drain(..) {
            sub.close(&self.pending);
        }
    }
}

/// Priority publish/subscribe bus. Cloning shares the same bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscriptions", &self.subscription_count())
            .field("pending", &self.inner.pending.current())
            .finish_non_exhaustive()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::build(BusConfig::default())
    }
}

impl MessageBus {
    /// Create a bus with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails [`BusConfig::validate`].
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscriptions: RwLock::new(Vec::new()),
                breakers: Mutex::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                pending: Arc::new(Pending::default()),
                next_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribe `subscriber` to every topic matching `pattern`.
    ///
    /// The subscription gets its own worker task on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` when called outside a Tokio runtime.
    pub fn subscribe(
        &self,
        subscriber: impl Into<String>,
        pattern: impl Into<TopicPattern>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId> {
        let subscriber = subscriber.into();
        let pattern = pattern.into();
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime {
            subscriber: subscriber.clone(),
        })?;

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let breaker = self.breaker_for(&subscriber, &pattern);
        let mailbox = Arc::new(Mailbox::default());

        let worker = Worker {
            subscriber: subscriber.clone(),
            mailbox: Arc::clone(&mailbox),
            breaker: Arc::clone(&breaker),
            handler,
            pending: Arc::clone(&self.inner.pending),
            timeout: self.inner.config.handler_timeout(),
        };
        runtime.spawn(worker.run());

        debug!(subscription = %id, subscriber = %subscriber, pattern = %pattern, "Subscribed");

        self.inner.subscriptions.write().push(Subscription {
            id,
            subscriber,
            pattern,
            mailbox,
            breaker,
        });

        Ok(id)
    }

    /// Remove a subscription. Queued messages for it are discarded; a running
    /// handler finishes.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let removed = {
            let mut subs = self.inner.subscriptions.write();
            subs.iter()
                .position(|sub| sub.id == id)
                .map(|index| subs.remove(index))
        };

        let sub = removed.ok_or(Error::SubscriptionNotFound(id))?;
        sub.close(&self.inner.pending);
        debug!(subscription = %id, subscriber = %sub.subscriber, "Unsubscribed");
        Ok(())
    }

    /// Publish a message built from its parts.
    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> PublishReceipt {
        self.publish_message(Message::new(topic, payload).with_priority(priority))
    }

    /// Publish a message to every matching subscriber.
    ///
    /// Never blocks on handlers: the message is queued in each admitted subscriber's
    /// mailbox. Subscribers whose breaker is open are skipped.
    pub fn publish_message(&self, message: Message) -> PublishReceipt {
        let message = Arc::new(message);
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        self.remember(&message);

        let mut delivered_to = Vec::new();
        let mut skipped = Vec::new();

        let subs = self.inner.subscriptions.read();
        for sub in subs.iter().filter(|sub| sub.pattern.matches(&message.topic)) {
            let admission = sub.breaker.lock().admit(now);
            if !admission.is_admitted() {
                debug!(
                    topic = %message.topic,
                    subscriber = %sub.subscriber,
                    "Skipping subscriber due to open circuit breaker"
                );
                skipped.push(sub.subscriber.clone());
                continue;
            }

            if admission == Admission::Probe {
                info!(
                    topic = %message.topic,
                    subscriber = %sub.subscriber,
                    "Cooldown elapsed, sending half-open probe"
                );
            }

            self.inner.pending.add();
            let queued = sub.mailbox.push(Envelope {
                message: Arc::clone(&message),
                priority: message.priority,
                seq,
                probe: admission == Admission::Probe,
            });
            if queued {
                delivered_to.push(sub.subscriber.clone());
            } else {
                self.inner.pending.done();
                skipped.push(sub.subscriber.clone());
            }
        }
        drop(subs);

        debug!(
            message_id = %message.id,
            topic = %message.topic,
            delivered = delivered_to.len(),
            skipped = skipped.len(),
            "Published message"
        );

        PublishReceipt {
            message_id: message.id,
            delivered_to,
            skipped,
        }
    }

    /// Wait until every queued delivery has been handled or dropped.
    pub async fn quiesce(&self) {
        self.inner.pending.wait_idle().await;
    }

    /// Up to `n` most recently published messages, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Arc<Message>> {
        let history = self.inner.history.lock();
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Inspect the breaker for a `(subscriber, pattern)` pair.
    #[must_use]
    pub fn breaker_snapshot(
        &self,
        subscriber: &str,
        pattern: impl Into<TopicPattern>,
    ) -> Option<CircuitBreakerState> {
        let key = (subscriber.to_string(), pattern.into().to_string());
        let breaker = self.inner.breakers.lock().get(&key).cloned()?;
        let state = breaker.lock().snapshot(Instant::now());
        Some(state)
    }

    /// Force a breaker closed. Returns false if the pair never subscribed.
    pub fn reset_breaker(&self, subscriber: &str, pattern: impl Into<TopicPattern>) -> bool {
        let key = (subscriber.to_string(), pattern.into().to_string());
        let Some(breaker) = self.inner.breakers.lock().get(&key).cloned() else {
            return false;
        };
        breaker.lock().reset();
        info!(subscriber = %key.0, pattern = %key.1, "Circuit breaker reset");
        true
    }

    fn breaker_for(&self, subscriber: &str, pattern: &TopicPattern) -> Arc<Mutex<CircuitBreaker>> {
        let key = (subscriber.to_string(), pattern.to_string());
        let mut breakers = self.inner.breakers.lock();
        Arc::clone(
            breakers
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(&self.inner.config)))),
        )
    }

    fn remember(&self, message: &Arc<Message>) {
        let capacity = self.inner.config.history_capacity;
        if capacity == 0 {
            return;
        }
        let mut history = self.inner.history.lock();
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(Arc::clone(message));
    }
}

/// Drains one subscription's mailbox.
struct Worker {
    subscriber: String,
    mailbox: Arc<Mailbox>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    handler: Arc<dyn MessageHandler>,
    pending: Arc<Pending>,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        while let Some(envelope) = self.mailbox.next().await {
            self.deliver(envelope).await;
            self.pending.done();
        }
        debug!(subscriber = %self.subscriber, "Subscription worker stopped");
    }

    async fn deliver(&self, envelope: Envelope) {
        // Queued before the breaker tripped.
        if !envelope.probe && self.breaker.lock().phase() != BreakerPhase::Closed {
            debug!(
                topic = %envelope.message.topic,
                subscriber = %self.subscriber,
                "Dropping queued message, circuit breaker not closed"
            );
            return;
        }

        let topic = envelope.message.topic.clone();
        let call = AssertUnwindSafe(self.handler.handle(envelope.message)).catch_unwind();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(()))) => DeliveryResult::Success,
            Ok(Ok(Err(err))) => {
                warn!(topic = %topic, subscriber = %self.subscriber, error = %err, "Handler failed");
                DeliveryResult::Failure
            }
            Ok(Err(_)) => {
                warn!(topic = %topic, subscriber = %self.subscriber, "Handler panicked");
                DeliveryResult::Failure
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    subscriber = %self.subscriber,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Handler timed out"
                );
                DeliveryResult::Failure
            }
        };

        let mut breaker = self.breaker.lock();
        let before = breaker.phase();
        breaker.record(result, envelope.probe, Instant::now());
        let after = breaker.phase();
        drop(breaker);

        if before != after {
            match after {
                BreakerPhase::Open => warn!(
                    subscriber = %self.subscriber,
                    topic = %topic,
                    from = %before,
                    "Circuit breaker opened"
                ),
                BreakerPhase::Closed => info!(
                    subscriber = %self.subscriber,
                    topic = %topic,
                    "Circuit breaker closed after successful probe"
                ),
                BreakerPhase::HalfOpen => {}
            }
        }
    }
}
