use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::signaling::host::HostPicker;
use crate::ws::messages::SignalingMessage;

/// Outbound channel handle for one connection. Each connection drains its
/// own ordered channel, which is what preserves per-sender ordering for
/// relayed negotiation messages.
pub type OutboundSender = mpsc::UnboundedSender<SignalingMessage>;

/// Connection state of a participant session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    /// Transport dropped; the session stays registered until the reconnect
    /// grace period expires, so peers never observe a brief blip.
    Grace,
}

/// Camera/microphone state mirrored for late joiners and UI
#[derive(Debug, Clone, Copy)]
pub struct MediaState {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// One live connection of a participant. `session_id` is unique per
/// connection; `user_id` is stable across reconnects.
#[derive(Debug)]
pub struct ParticipantSession {
    pub session_id: String,
    pub user_id: String,
    pub display: String,
    pub email: String,
    pub connection: ConnectionState,
    pub media: MediaState,
    pub is_host: bool,
    pub sender: OutboundSender,
}

impl ParticipantSession {
    pub fn new(
        session_id: String,
        user_id: String,
        display: String,
        email: String,
        sender: OutboundSender,
    ) -> Self {
        Self {
            session_id,
            user_id,
            display,
            email,
            connection: ConnectionState::Active,
            media: MediaState::default(),
            is_host: false,
            sender,
        }
    }
}

pub(crate) struct RoomInner {
    /// Sessions in join order; `peer_ids_excluding` reports this order.
    pub(crate) sessions: Vec<ParticipantSession>,
    pub(crate) host_session_id: Option<String>,
    pub(crate) screenshare_holder: Option<String>,
    pub(crate) ended: bool,
}

impl RoomInner {
    pub(crate) fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.session_id == session_id)
    }

    pub(crate) fn session(&self, session_id: &str) -> Option<&ParticipantSession> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    pub(crate) fn session_mut(&mut self, session_id: &str) -> Option<&mut ParticipantSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
    }

    pub(crate) fn is_host(&self, session_id: &str) -> bool {
        self.host_session_id.as_deref() == Some(session_id)
    }
}

/// Grace session replaced by a reconnect of the same user
#[derive(Debug)]
pub struct ReplacedSession {
    pub session_id: String,
    pub was_host: bool,
    pub held_screenshare: bool,
}

/// Result of registering a session, captured under the room lock
pub struct JoinSnapshot {
    /// Peer ids in join order, for the joiner's `existing-peers` list
    pub peer_ids: Vec<String>,
    /// Senders of those peers, for `new-peer` / `peer-info` fan-out
    pub peers: Vec<OutboundSender>,
    pub is_host: bool,
    pub replaced: Option<ReplacedSession>,
}

/// Result of the atomic disconnect finalization
pub struct FinalizeOutcome {
    pub user_id: String,
    /// Slot was held by the departing session and has been released
    pub screenshare_released: bool,
    /// Failover target: the session elected host, if any peer remained
    pub new_host: Option<(String, OutboundSender)>,
    pub new_host_user_id: Option<String>,
    pub remaining: Vec<OutboundSender>,
    pub room_drained: bool,
}

/// One meeting's coordination state: membership, host pointer, screenshare
/// slot. Every transition takes the room mutex exactly once, so compound
/// cleanup (remove + slot release + host failover) is atomic per room.
pub struct MeetingRoom {
    pub room_id: String,
    inner: Mutex<RoomInner>,
}

impl MeetingRoom {
    pub(crate) fn new(room_id: String) -> Self {
        Self {
            room_id,
            inner: Mutex::new(RoomInner {
                sessions: Vec::new(),
                host_session_id: None,
                screenshare_holder: None,
                ended: false,
            }),
        }
    }

    pub(crate) fn inner(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session. `claims_host` is true when the joining identity
    /// is the meeting creator; it takes the host pointer only if the room is
    /// currently unhosted. A lingering grace session of the same user is
    /// replaced silently, and the replacement inherits its host pointer.
    pub fn add_session(&self, mut session: ParticipantSession, claims_host: bool) -> JoinSnapshot {
        let mut guard = self.inner();
        let inner = &mut *guard;

        let replaced = inner
            .sessions
            .iter()
            .position(|s| {
                s.user_id == session.user_id && s.connection == ConnectionState::Grace
            })
            .map(|idx| {
                let old = inner.sessions.remove(idx);
                let was_host = inner.is_host(&old.session_id);
                let held_screenshare =
                    inner.screenshare_holder.as_deref() == Some(old.session_id.as_str());
                if was_host {
                    inner.host_session_id = None;
                }
                if held_screenshare {
                    inner.screenshare_holder = None;
                }
                ReplacedSession {
                    session_id: old.session_id,
                    was_host,
                    held_screenshare,
                }
            });

        let inherits_host = replaced.as_ref().map(|r| r.was_host).unwrap_or(false);

        let peer_ids: Vec<String> = inner
            .sessions
            .iter()
            .map(|s| s.session_id.clone())
            .collect();
        let peers: Vec<OutboundSender> =
            inner.sessions.iter().map(|s| s.sender.clone()).collect();

        let takes_host =
            inherits_host || (claims_host && inner.host_session_id.is_none());
        if takes_host {
            inner.host_session_id = Some(session.session_id.clone());
            session.is_host = true;
        }
        let is_host = session.is_host;
        inner.sessions.push(session);

        JoinSnapshot {
            peer_ids,
            peers,
            is_host,
            replaced,
        }
    }

    /// Flag a session as disconnected-but-within-grace
    pub fn mark_grace(&self, session_id: &str) -> bool {
        let mut inner = self.inner();
        match inner.session_mut(session_id) {
            Some(session) => {
                session.connection = ConnectionState::Grace;
                true
            }
            None => false,
        }
    }

    /// Atomic disconnect finalization: remove the session, release a held
    /// screenshare slot, and run host failover, all under one lock.
    pub fn finalize_remove(
        &self,
        session_id: &str,
        picker: &dyn HostPicker,
    ) -> Option<FinalizeOutcome> {
        let mut guard = self.inner();
        let inner = &mut *guard;
        let idx = inner.position(session_id)?;
        let removed = inner.sessions.remove(idx);

        let screenshare_released =
            inner.screenshare_holder.as_deref() == Some(session_id);
        if screenshare_released {
            inner.screenshare_holder = None;
        }

        let mut new_host = None;
        let mut new_host_user_id = None;
        if inner.is_host(session_id) {
            inner.host_session_id = None;
            // No elections in a force-ended room; the pointer stays null.
            if !inner.ended && !inner.sessions.is_empty() {
                let pick = picker.pick(inner.sessions.len());
                let elected = &mut inner.sessions[pick];
                elected.is_host = true;
                inner.host_session_id = Some(elected.session_id.clone());
                new_host = Some((elected.session_id.clone(), elected.sender.clone()));
                new_host_user_id = Some(elected.user_id.clone());
            }
        }

        let remaining = inner.sessions.iter().map(|s| s.sender.clone()).collect();
        let room_drained = inner.sessions.is_empty();

        Some(FinalizeOutcome {
            user_id: removed.user_id,
            screenshare_released,
            new_host,
            new_host_user_id,
            remaining,
            room_drained,
        })
    }

    /// Peer ids in join order, excluding one session
    pub fn peer_ids_excluding(&self, session_id: &str) -> Vec<String> {
        self.inner()
            .sessions
            .iter()
            .filter(|s| s.session_id != session_id)
            .map(|s| s.session_id.clone())
            .collect()
    }

    /// Senders of every session except one
    pub fn peer_senders_excluding(&self, session_id: &str) -> Vec<OutboundSender> {
        self.inner()
            .sessions
            .iter()
            .filter(|s| s.session_id != session_id)
            .map(|s| s.sender.clone())
            .collect()
    }

    /// Sender of one session, if it is still registered
    pub fn sender_of(&self, session_id: &str) -> Option<OutboundSender> {
        self.inner().session(session_id).map(|s| s.sender.clone())
    }

    /// Update a session's mute/camera state
    pub fn set_media(&self, session_id: &str, video: bool, audio: bool) -> bool {
        let mut inner = self.inner();
        match inner.session_mut(session_id) {
            Some(session) => {
                session.media = MediaState { video, audio };
                true
            }
            None => false,
        }
    }

    pub fn host_session_id(&self) -> Option<String> {
        self.inner().host_session_id.clone()
    }

    pub fn screenshare_holder(&self) -> Option<String> {
        self.inner().screenshare_holder.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.inner().ended
    }

    pub fn session_count(&self) -> usize {
        self.inner().sessions.len()
    }
}

/// Process-wide registry of active meeting rooms. Owns `MeetingRoom` and
/// `ParticipantSession` lifetimes; every other component goes through its
/// API, never into another session's fields.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<MeetingRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, room_id: &str) -> Arc<MeetingRoom> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(MeetingRoom::new(room_id.to_string())))
            .clone()
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<MeetingRoom>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// Drop a room once it has been force-ended and all sessions drained.
    /// A room that merely emptied out persists until explicitly ended.
    pub fn remove_if_drained(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, room| room.is_ended() && room.session_count() == 0);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
