//! Per-session in-flight guard.
//!
//! The caller-facing contract is one in-flight turn per session. Rather than
//! relying on caller discipline, the pipeline enforces it here: a permit is
//! taken before any work and released on drop, so interleaved pair writes
//! cannot happen even when the turn task ends early.

use std::sync::Arc;

use dashmap::DashMap;

#[derive(Clone, Default)]
pub struct InFlightSessions {
    inner: Arc<DashMap<String, ()>>,
}

impl InFlightSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the session's permit, or `None` if a turn is already in flight.
    pub fn acquire(&self, session_id: &str) -> Option<SessionPermit> {
        use dashmap::mapref::entry::Entry;
        match self.inner.entry(session_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(SessionPermit {
                    sessions: self.inner.clone(),
                    session_id: session_id.to_string(),
                })
            }
        }
    }
}

/// Exclusive right to run one turn for a session. Released on drop.
pub struct SessionPermit {
    sessions: Arc<DashMap<String, ()>>,
    session_id: String,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.sessions.remove(&self.session_id);
    }
}
