//! Per-subscription priority mailbox and the bus-wide in-flight counter.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::{Message, Priority};

/// A message queued for one subscriber.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub(crate) message: Arc<Message>,
    pub(crate) priority: Priority,
    /// Bus-wide publish sequence, FIFO tie-break within a priority.
    pub(crate) seq: u64,
    /// Admitted as the half-open probe.
    pub(crate) probe: bool,
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    // Max-heap: higher priority first, then the earlier publish.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-consumer priority queue drained by a subscription's worker task.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    queue: Mutex<BinaryHeap<Envelope>>,
    ready: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    /// Queue an envelope. Returns false once the mailbox is closed.
    pub(crate) fn push(&self, envelope: Envelope) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.queue.lock().push(envelope);
        self.ready.notify_one();
        true
    }

    /// Wait for the next envelope; `None` once closed.
    pub(crate) async fn next(&self) -> Option<Envelope> {
        loop {
            let notified = self.ready.notified();
            if let Some(envelope) = self.queue.lock().pop() {
                return Some(envelope);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Close the mailbox and hand back the envelopes that were still queued.
    pub(crate) fn close(&self) -> Vec<Envelope> {
        self.closed.store(true, Ordering::Release);
        let dropped = std::mem::take(&mut *self.queue.lock()).into_vec();
        self.ready.notify_one();
        dropped
    }
}

/// Counts deliveries that are queued or running across the whole bus.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    pub(crate) fn add(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn done(&self) {
        self.done_many(1);
    }

    pub(crate) fn done_many(&self, n: usize) {
        if n == 0 {
            return;
        }
        let previous = self.count.fetch_sub(n, Ordering::AcqRel);
        if previous <= n {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolve once no delivery is queued or running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}
