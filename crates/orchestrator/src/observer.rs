//! Session lifecycle hook.

use concord_blackboard::Blackboard;
use concord_core::SessionId;

use crate::session::SessionPhase;

/// Notified synchronously each time a session enters a phase.
///
/// Runs on the session's task before the phase does any work, so anything the
/// observer writes to the blackboard is visible to that phase.
pub trait PhaseObserver: Send + Sync {
    fn on_phase(&self, session: &SessionId, phase: SessionPhase, blackboard: &Blackboard) {
        let _ = (session, phase, blackboard);
    }
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {}
