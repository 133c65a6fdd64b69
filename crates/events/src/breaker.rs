//! Per-subscriber circuit breaker.
//!
//! Tracks handler failures in a sliding window and moves between three phases:
//! - Closed: messages are delivered
//! - Open: messages are skipped until the cooldown deadline passes
//! - HalfOpen: a single probe delivery is in flight, everything else is skipped
//!
//! Every method takes the current instant explicitly so the bus can drive it with
//! `tokio::time::Instant`, which honours a paused test clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::BusConfig;

/// Breaker phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    /// Normal operation.
    Closed,
    /// Tripped, deliveries are skipped.
    Open,
    /// Cooldown elapsed, one probe delivery in flight.
    HalfOpen,
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Result of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    Failure,
}

/// Decision for one message about to be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, deliver normally.
    Deliver,
    /// Cooldown elapsed, deliver as the single half-open probe.
    Probe,
    /// Skip without invoking the handler.
    Reject,
}

impl Admission {
    /// Whether the message should reach the handler.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// Point-in-time view of a breaker, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub phase: BreakerPhase,
    pub consecutive_failures: u32,
    pub failures_in_window: usize,
    pub last_failure: Option<Instant>,
    /// Cooldown that applies the next time the breaker opens or is open now.
    pub cooldown: Duration,
    /// When an open breaker admits its probe.
    pub cooldown_deadline: Option<Instant>,
}

/// Circuit breaker with sliding window failure tracking and capped exponential backoff.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    base_cooldown: Duration,
    max_cooldown: Duration,
    multiplier: u32,
    phase: BreakerPhase,
    failures: VecDeque<Instant>,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    cooldown: Duration,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker from bus configuration.
    #[must_use]
    pub fn new(config: &BusConfig) -> Self {
        Self {
            threshold: config.failure_threshold,
            window: config.failure_window(),
            base_cooldown: config.base_cooldown(),
            max_cooldown: config.max_cooldown(),
            multiplier: config.backoff_multiplier,
            phase: BreakerPhase::Closed,
            failures: VecDeque::new(),
            consecutive_failures: 0,
            last_failure: None,
            cooldown: config.base_cooldown(),
            open_until: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> BreakerPhase {
        self.phase
    }

    /// Decide whether a message may be delivered at `now`.
    ///
    /// An open breaker whose cooldown has passed moves to half-open and admits exactly
    /// one probe; further calls are rejected until that probe is recorded.
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.phase {
            BreakerPhase::Closed => Admission::Deliver,
            BreakerPhase::HalfOpen => Admission::Reject,
            BreakerPhase::Open => {
                let due = self.open_until.is_none_or(|deadline| now >= deadline);
                if due {
                    self.phase = BreakerPhase::HalfOpen;
                    Admission::Probe
                } else {
                    Admission::Reject
                }
            }
        }
    }

    /// Record the result of a delivery admitted earlier.
    ///
    /// `was_probe` must be true for the delivery that was admitted as `Probe`. Results
    /// of ordinary deliveries that finish after the breaker tripped are ignored.
    pub fn record(&mut self, result: DeliveryResult, was_probe: bool, now: Instant) {
        if was_probe {
            match result {
                DeliveryResult::Success => self.close(),
                DeliveryResult::Failure => {
                    self.note_failure(now);
                    let extended = self
                        .cooldown
                        .saturating_mul(self.multiplier)
                        .min(self.max_cooldown);
                    self.cooldown = extended;
                    self.open(now);
                }
            }
            return;
        }

        if self.phase != BreakerPhase::Closed {
            return;
        }

        match result {
            DeliveryResult::Success => {
                self.failures.clear();
                self.consecutive_failures = 0;
            }
            DeliveryResult::Failure => {
                self.note_failure(now);
                self.failures.push_back(now);
                self.prune(now);
                let in_window = u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
                if in_window >= self.threshold {
                    self.open(now);
                }
            }
        }
    }

    /// Re-arm an unanswered probe whose message was discarded, so the next
    /// message is admitted as the probe instead.
    pub fn abandon_probe(&mut self, now: Instant) {
        if self.phase == BreakerPhase::HalfOpen {
            self.phase = BreakerPhase::Open;
            self.open_until = Some(now);
        }
    }

    /// Force the breaker back to closed with the base cooldown.
    pub fn reset(&mut self) {
        self.close();
        self.last_failure = None;
    }

    /// Snapshot the breaker at `now`.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> CircuitBreakerState {
        let failures_in_window = self
            .failures
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= self.window)
            .count();
        CircuitBreakerState {
            phase: self.phase,
            consecutive_failures: self.consecutive_failures,
            failures_in_window,
            last_failure: self.last_failure,
            cooldown: self.cooldown,
            cooldown_deadline: self.open_until,
        }
    }

    fn note_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
    }

    fn prune(&mut self, now: Instant) {
        while self
            .failures
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) > self.window)
        {
            self.failures.pop_front();
        }
    }

    fn open(&mut self, now: Instant) {
        self.phase = BreakerPhase::Open;
        self.open_until = Some(now.checked_add(self.cooldown).unwrap_or(now));
    }

    fn close(&mut self) {
        self.phase = BreakerPhase::Closed;
        self.failures.clear();
        self.consecutive_failures = 0;
        self.cooldown = self.base_cooldown;
        self.open_until = None;
    }
}
