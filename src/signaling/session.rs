use dashmap::DashMap;
use tokio::task::AbortHandle;

/// Where a disconnected session is waiting out its grace period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLeave {
    pub room_id: String,
    pub session_id: String,
}

struct GraceTimer {
    pending: PendingLeave,
    abort: AbortHandle,
}

/// Owns the reconnect grace timers, keyed by `user_id` (a reconnect creates
/// a new session id, so the session id cannot be the key). At most one live
/// timer per user.
pub struct SessionManager {
    timers: DashMap<String, GraceTimer>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Register an armed timer. An existing timer for the same user is
    /// aborted and replaced.
    pub fn arm(&self, user_id: &str, pending: PendingLeave, abort: AbortHandle) {
        if let Some(previous) = self
            .timers
            .insert(user_id.to_string(), GraceTimer { pending, abort })
        {
            previous.abort.abort();
        }
    }

    /// Cancel the timer for a reconnecting user. Returns where the grace
    /// session sits so the join path can replace or finalize it.
    pub fn cancel(&self, user_id: &str) -> Option<PendingLeave> {
        self.timers.remove(user_id).map(|(_, timer)| {
            timer.abort.abort();
            timer.pending
        })
    }

    /// Claim the timer at expiry. Returns the pending leave only if the
    /// armed timer still refers to this session, so an expiry racing a
    /// reconnect cannot finalize the wrong session.
    pub fn claim_expired(&self, user_id: &str, session_id: &str) -> Option<PendingLeave> {
        self.timers
            .remove_if(user_id, |_, timer| timer.pending.session_id == session_id)
            .map(|(_, timer)| timer.pending)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_abort() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn cancel_returns_pending_leave() {
        let manager = SessionManager::new();
        let pending = PendingLeave {
            room_id: "m1".to_string(),
            session_id: "s1".to_string(),
        };
        manager.arm("u1", pending.clone(), dummy_abort());

        assert_eq!(manager.cancel("u1"), Some(pending));
        assert_eq!(manager.cancel("u1"), None);
    }

    #[tokio::test]
    async fn rearm_keeps_one_timer_per_user() {
        let manager = SessionManager::new();
        let first = PendingLeave {
            room_id: "m1".to_string(),
            session_id: "s1".to_string(),
        };
        let second = PendingLeave {
            room_id: "m1".to_string(),
            session_id: "s2".to_string(),
        };
        manager.arm("u1", first, dummy_abort());
        manager.arm("u1", second.clone(), dummy_abort());

        assert_eq!(manager.armed_count(), 1);
        assert_eq!(manager.cancel("u1"), Some(second));
    }

    #[tokio::test]
    async fn claim_expired_requires_matching_session() {
        let manager = SessionManager::new();
        let pending = PendingLeave {
            room_id: "m1".to_string(),
            session_id: "s1".to_string(),
        };
        manager.arm("u1", pending.clone(), dummy_abort());

        // A stale expiry for a superseded session claims nothing.
        assert_eq!(manager.claim_expired("u1", "s0"), None);
        assert_eq!(manager.claim_expired("u1", "s1"), Some(pending));
        assert_eq!(manager.armed_count(), 0);
    }
}
