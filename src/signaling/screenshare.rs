use crate::signaling::registry::{MeetingRoom, OutboundSender};

/// Outcome of a screenshare request, decided under the room lock
pub enum ShareRequest {
    /// Slot held by a different session: auto-denied, the host never sees it
    Denied,
    /// Slot free: the current host gets the approval prompt
    ForwardToHost { host_sender: OutboundSender },
    /// Slot free and the room is unhosted: nobody to arbitrate, approved
    AutoApproved,
}

/// Outcome of a `screenshare-state` update
#[derive(Debug, PartialEq, Eq)]
pub enum ShareStateChange {
    /// Slot taken or released; broadcast the change
    Changed,
    /// Slot held by someone else, or a clear by a non-holder: ignored
    Rejected,
}

impl MeetingRoom {
    /// Arbitrate a screenshare request. At most one session holds the slot
    /// at any time; a request against an occupied slot fails fast without
    /// queuing or host involvement.
    pub fn request_screenshare(&self, requester_session_id: &str) -> ShareRequest {
        let inner = self.inner();

        if let Some(holder) = inner.screenshare_holder.as_deref() {
            if holder != requester_session_id {
                return ShareRequest::Denied;
            }
        }

        match inner
            .host_session_id
            .as_deref()
            .and_then(|host_id| inner.session(host_id))
        {
            Some(host) => ShareRequest::ForwardToHost {
                host_sender: host.sender.clone(),
            },
            None => ShareRequest::AutoApproved,
        }
    }

    /// Take or release the slot. A session can only release a slot it
    /// holds, and cannot steal one held by another session.
    pub fn set_screenshare(&self, session_id: &str, is_sharing: bool) -> ShareStateChange {
        let mut inner = self.inner();

        if is_sharing {
            match inner.screenshare_holder.as_deref() {
                Some(holder) if holder != session_id => ShareStateChange::Rejected,
                Some(_) => ShareStateChange::Changed, // already held; re-broadcast
                None => {
                    inner.screenshare_holder = Some(session_id.to_string());
                    ShareStateChange::Changed
                }
            }
        } else {
            match inner.screenshare_holder.as_deref() {
                Some(holder) if holder == session_id => {
                    inner.screenshare_holder = None;
                    ShareStateChange::Changed
                }
                _ => ShareStateChange::Rejected,
            }
        }
    }
}
