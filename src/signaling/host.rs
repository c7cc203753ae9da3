use crate::signaling::registry::{MeetingRoom, OutboundSender};

/// Choice of failover/handoff target among a room's remaining sessions.
/// Injectable so tests can pin the election deterministically.
pub trait HostPicker: Send + Sync {
    /// Returns an index in `0..candidates`. `candidates` is never zero.
    fn pick(&self, candidates: usize) -> usize;
}

/// Uniformly random pick, the production behavior
pub struct RandomPicker;

impl HostPicker for RandomPicker {
    fn pick(&self, candidates: usize) -> usize {
        use rand::Rng;
        rand::rng().random_range(0..candidates)
    }
}

/// Always picks a fixed index; test-only
#[cfg(test)]
pub struct FixedPicker(pub usize);

#[cfg(test)]
impl HostPicker for FixedPicker {
    fn pick(&self, candidates: usize) -> usize {
        self.0.min(candidates - 1)
    }
}

/// A completed host handoff, captured under the room lock
#[derive(Debug)]
pub struct HostTransfer {
    pub to_session_id: String,
    pub to_user_id: String,
    pub to_sender: OutboundSender,
    pub from_user_id: String,
}

/// Why a host transition was refused
#[derive(Debug, PartialEq, Eq)]
pub enum HostTransferError {
    /// Issuer does not hold the host pointer
    NotHost,
    /// Named target is not registered in the room
    TargetMissing,
    /// No other session to hand off to
    NoPeers,
}

fn transfer_locked(
    inner: &mut crate::signaling::registry::RoomInner,
    from_session_id: &str,
    target_session_id: &str,
) -> Result<HostTransfer, HostTransferError> {
    if !inner.is_host(from_session_id) {
        return Err(HostTransferError::NotHost);
    }
    if inner.position(target_session_id).is_none() {
        return Err(HostTransferError::TargetMissing);
    }

    let from_user_id = match inner.session_mut(from_session_id) {
        Some(old) => {
            old.is_host = false;
            old.user_id.clone()
        }
        None => return Err(HostTransferError::NotHost),
    };

    // Presence checked above.
    let target = match inner.session_mut(target_session_id) {
        Some(target) => target,
        None => return Err(HostTransferError::TargetMissing),
    };
    target.is_host = true;
    let transfer = HostTransfer {
        to_session_id: target.session_id.clone(),
        to_user_id: target.user_id.clone(),
        to_sender: target.sender.clone(),
        from_user_id,
    };
    inner.host_session_id = Some(transfer.to_session_id.clone());

    Ok(transfer)
}

impl MeetingRoom {
    /// Manual transfer: the current host designates a specific target,
    /// effective immediately. Pointer and `is_host` mirrors flip in one
    /// transition; a racing failover resolves last-writer-wins on the lock.
    pub fn manual_transfer_host(
        &self,
        from_session_id: &str,
        target_session_id: &str,
    ) -> Result<HostTransfer, HostTransferError> {
        let mut guard = self.inner();
        transfer_locked(&mut guard, from_session_id, target_session_id)
    }

    /// Voluntary handoff to a uniformly random remaining session. The pick
    /// and the pointer flip happen under the same lock.
    pub fn random_transfer_host(
        &self,
        from_session_id: &str,
        picker: &dyn HostPicker,
    ) -> Result<HostTransfer, HostTransferError> {
        let mut guard = self.inner();

        if !guard.is_host(from_session_id) {
            return Err(HostTransferError::NotHost);
        }
        let candidates: Vec<String> = guard
            .sessions
            .iter()
            .filter(|s| s.session_id != from_session_id)
            .map(|s| s.session_id.clone())
            .collect();
        if candidates.is_empty() {
            return Err(HostTransferError::NoPeers);
        }
        let target = candidates[picker.pick(candidates.len())].clone();

        transfer_locked(&mut guard, from_session_id, &target)
    }

    /// Forced end by the host. Marks the room ended and returns the senders
    /// of every other session, for the `meeting-force-ended` fan-out. No
    /// failover or further election happens on an ended room.
    pub fn end_meeting(&self, from_session_id: &str) -> Option<Vec<OutboundSender>> {
        let mut inner = self.inner();
        if !inner.is_host(from_session_id) {
            return None;
        }

        inner.ended = true;
        Some(
            inner
                .sessions
                .iter()
                .filter(|s| s.session_id != from_session_id)
                .map(|s| s.sender.clone())
                .collect(),
        )
    }
}
