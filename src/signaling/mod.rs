pub mod host;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod screenshare;
pub mod session;

pub use host::{HostPicker, RandomPicker};
pub use registry::{MeetingRoom, OutboundSender, ParticipantSession, RoomRegistry};
pub use session::{PendingLeave, SessionManager};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Claims, MeetingStatus, ParticipantRecord};
use crate::persistence::{MeetingDirectory, RecordSink};
use crate::signaling::screenshare::{ShareRequest, ShareStateChange};
use crate::ws::messages::{
    msg_types, ChatBroadcastPayload, EmojiBroadcastPayload, ManualTransferHostPayload,
    MediaStatePayload, PeerInfoPayload, PeerMediaStatePayload, RelayInPayload,
    ScreenshareApprovedPayload,
    ScreenshareRequestedPayload, ScreenshareResponsePayload, ScreenshareStateChangedPayload,
    SignalingMessage,
};


fn outbound<T: Serialize>(msg_type: &str, payload: &T) -> SignalingMessage {
    SignalingMessage::new(
        msg_type,
        serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
    )
}

/// Fire-and-forget persistence write: never awaited on the signaling path,
/// failure logged and dropped, room state unaffected.
fn spawn_persist<F>(task: &'static str, fut: F)
where
    F: std::future::Future<Output = crate::error::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::warn!(error = %e, task, "Best-effort persistence write failed");
        }
    });
}

/// Per-connection context owned by the socket task. Everything the dispatch
/// loop needs to route an event; all shared state stays in the registry.
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub display: String,
    pub email: String,
    pub sender: OutboundSender,
    pub room_id: Option<String>,
    /// Grace session of this user cancelled at connect time, waiting for a
    /// join to replace it (same room) or finalize it (different room).
    pending_rejoin: Option<PendingLeave>,
}

/// The meeting coordination core. One instance per process, created at
/// service start and injected into every connection handler.
pub struct SignalingService {
    rooms: RoomRegistry,
    sessions: SessionManager,
    directory: Arc<dyn MeetingDirectory>,
    records: Arc<dyn RecordSink>,
    picker: Arc<dyn HostPicker>,
    grace: Duration,
}

impl SignalingService {
    pub fn new(
        directory: Arc<dyn MeetingDirectory>,
        records: Arc<dyn RecordSink>,
        picker: Arc<dyn HostPicker>,
        grace: Duration,
    ) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            sessions: SessionManager::new(),
            directory,
            records,
            picker,
            grace,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Bind a verified identity to a new connection. Cancels an armed
    /// reconnect timer for the user, which is what makes a brief network
    /// blip invisible to the rest of the room.
    pub fn connect(&self, claims: &Claims, sender: OutboundSender) -> SessionContext {
        let session_id = Uuid::new_v4().to_string();
        let pending_rejoin = self.sessions.cancel(&claims.sub);

        if pending_rejoin.is_some() {
            tracing::info!(
                session_id = %session_id,
                user_id = %claims.sub,
                "Reconnect within grace period, timer cancelled"
            );
        }

        SessionContext {
            session_id,
            user_id: claims.sub.clone(),
            display: claims.name.clone(),
            email: claims.email.clone(),
            sender,
            room_id: None,
            pending_rejoin,
        }
    }

    /// join-meeting: validate the meeting (external precondition), register
    /// the session, announce presence. Failures surface as `join-error` and
    /// create no session.
    pub async fn handle_join(&self, ctx: &mut SessionContext, meeting_id: &str) {
        if ctx.room_id.is_some() {
            tracing::warn!(session_id = %ctx.session_id, "Duplicate join-meeting ignored");
            return;
        }

        let meeting = match self.directory.find_meeting(meeting_id).await {
            Ok(Some(meeting)) => meeting,
            Ok(None) => {
                let _ = ctx
                    .sender
                    .send(SignalingMessage::join_error("Meeting does not exist"));
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, meeting_id = %meeting_id, "Meeting lookup failed");
                let _ = ctx
                    .sender
                    .send(SignalingMessage::join_error("Meeting lookup failed"));
                return;
            }
        };

        if meeting.status == MeetingStatus::Ended {
            let _ = ctx
                .sender
                .send(SignalingMessage::join_error("Meeting has ended"));
            return;
        }
        if meeting.status == MeetingStatus::Scheduled {
            let directory = Arc::clone(&self.directory);
            let id = meeting_id.to_string();
            spawn_persist("activate-meeting", async move {
                directory.activate_meeting(&id).await
            });
        }

        // A grace session left behind in another room is a real departure.
        if let Some(pending) = ctx.pending_rejoin.take() {
            if pending.room_id != meeting_id {
                self.finalize_leave(&pending);
            }
        }

        let room = self.rooms.get_or_create(meeting_id);
        if room.is_ended() {
            let _ = ctx
                .sender
                .send(SignalingMessage::join_error("Meeting has ended"));
            return;
        }

        let claims_host = meeting.created_by == ctx.user_id;
        let session = ParticipantSession::new(
            ctx.session_id.clone(),
            ctx.user_id.clone(),
            ctx.display.clone(),
            ctx.email.clone(),
            ctx.sender.clone(),
        );
        let snapshot = room.add_session(session, claims_host);

        if let Some(replaced) = &snapshot.replaced {
            if replaced.held_screenshare {
                let released = outbound(
                    msg_types::SCREENSHARE_STATE_CHANGED,
                    &ScreenshareStateChangedPayload {
                        session_id: replaced.session_id.clone(),
                        is_sharing: false,
                    },
                );
                for peer in &snapshot.peers {
                    let _ = peer.send(released.clone());
                }
            }
        }

        presence::announce_join(
            &ctx.sender,
            &ctx.session_id,
            &ctx.display,
            &ctx.email,
            &snapshot,
        );
        ctx.room_id = Some(meeting_id.to_string());

        tracing::info!(
            room_id = %meeting_id,
            session_id = %ctx.session_id,
            user_id = %ctx.user_id,
            is_host = snapshot.is_host,
            "Session joined meeting"
        );

        let records = Arc::clone(&self.records);
        let record = ParticipantRecord {
            meeting_id: meeting_id.to_string(),
            user_id: ctx.user_id.clone(),
            email: ctx.email.clone(),
            name: ctx.display.clone(),
            session_id: ctx.session_id.clone(),
            is_host: snapshot.is_host,
            join_time: Utc::now(),
            leave_time: None,
        };
        spawn_persist("record-join", async move {
            records.record_join(&record).await
        });
    }

    /// Transport dropped. The session stays registered in grace state and a
    /// reconnect timer is armed for the user; peers observe nothing yet.
    pub fn handle_disconnect(self: Arc<Self>, ctx: &mut SessionContext) {
        if let Some(room_id) = ctx.room_id.clone() {
            if let Some(room) = self.rooms.get(&room_id) {
                room.mark_grace(&ctx.session_id);
            }
            tracing::info!(
                room_id = %room_id,
                session_id = %ctx.session_id,
                user_id = %ctx.user_id,
                grace_ms = self.grace.as_millis() as u64,
                "Session disconnected, grace period armed"
            );
            let pending = PendingLeave {
                room_id,
                session_id: ctx.session_id.clone(),
            };
            self.arm_grace(ctx.user_id.clone(), pending);
        } else if let Some(pending) = ctx.pending_rejoin.take() {
            // Reconnected but never rejoined; restore the original timer so
            // the grace session cannot linger forever.
            self.arm_grace(ctx.user_id.clone(), pending);
        }
    }

    fn arm_grace(self: Arc<Self>, user_id: String, pending: PendingLeave) {
        let service = Arc::clone(&self);
        let uid = user_id.clone();
        let expiring = pending.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(service.grace).await;
            if let Some(claimed) = service.sessions.claim_expired(&uid, &expiring.session_id) {
                service.finalize_leave(&claimed);
            }
        });
        self.sessions.arm(&user_id, pending, handle.abort_handle());
    }

    /// The finalize-leave sequence, atomic per room: remove the session,
    /// release a held screenshare slot, run host failover, then broadcast
    /// `peer-disconnected` exactly once.
    fn finalize_leave(&self, pending: &PendingLeave) {
        let Some(room) = self.rooms.get(&pending.room_id) else {
            return;
        };
        let Some(outcome) = room.finalize_remove(&pending.session_id, &*self.picker) else {
            return;
        };

        presence::announce_leave(&outcome.remaining, &pending.session_id);

        if outcome.screenshare_released {
            let released = outbound(
                msg_types::SCREENSHARE_STATE_CHANGED,
                &ScreenshareStateChangedPayload {
                    session_id: pending.session_id.clone(),
                    is_sharing: false,
                },
            );
            for peer in &outcome.remaining {
                let _ = peer.send(released.clone());
            }
        }

        if let Some((new_host_id, new_host_sender)) = &outcome.new_host {
            let _ = new_host_sender.send(outbound(
                msg_types::YOU_ARE_NEW_HOST,
                &serde_json::json!({}),
            ));
            tracing::info!(
                room_id = %pending.room_id,
                new_host = %new_host_id,
                "Host failover after grace expiry"
            );
            if let Some(to_user) = &outcome.new_host_user_id {
                let records = Arc::clone(&self.records);
                let meeting_id = pending.room_id.clone();
                let from_user = outcome.user_id.clone();
                let to_user = to_user.clone();
                spawn_persist("record-host-transfer", async move {
                    records
                        .record_host_transfer(&meeting_id, &from_user, &to_user)
                        .await
                });
            }
        }

        tracing::info!(
            room_id = %pending.room_id,
            session_id = %pending.session_id,
            user_id = %outcome.user_id,
            "Leave finalized"
        );

        let records = Arc::clone(&self.records);
        let meeting_id = pending.room_id.clone();
        let user_id = outcome.user_id.clone();
        spawn_persist("record-leave", async move {
            records.record_leave(&meeting_id, &user_id).await
        });

        self.rooms.remove_if_drained(&pending.room_id);
    }

    fn joined_room(&self, ctx: &SessionContext) -> Option<Arc<MeetingRoom>> {
        let room_id = ctx.room_id.as_deref()?;
        self.rooms.get(room_id)
    }

    // ==================== Event handlers ====================

    /// offer / answer / ice-candidate: opaque point-to-point pass-through
    pub fn handle_relay(&self, ctx: &SessionContext, kind: &str, envelope: RelayInPayload) {
        if let Some(room) = self.joined_room(ctx) {
            relay::relay(&room, kind, &ctx.session_id, envelope);
        }
    }

    pub fn handle_media_state(&self, ctx: &SessionContext, payload: MediaStatePayload) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        room.set_media(&ctx.session_id, payload.video, payload.audio);

        let msg = outbound(
            msg_types::PEER_MEDIA_STATE,
            &PeerMediaStatePayload {
                session_id: ctx.session_id.clone(),
                video: payload.video,
                audio: payload.audio,
            },
        );
        for peer in room.peer_senders_excluding(&ctx.session_id) {
            let _ = peer.send(msg.clone());
        }
    }

    /// host-info: re-announce identity to the room and refresh the join
    /// record, issued by clients after they settle their local media.
    pub fn handle_host_info(&self, ctx: &SessionContext) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        let msg = outbound(
            msg_types::PEER_INFO,
            &PeerInfoPayload {
                session_id: ctx.session_id.clone(),
                display_name: ctx.display.clone(),
                email: ctx.email.clone(),
            },
        );
        for peer in room.peer_senders_excluding(&ctx.session_id) {
            let _ = peer.send(msg.clone());
        }

        let is_host = room.host_session_id().as_deref() == Some(ctx.session_id.as_str());
        let records = Arc::clone(&self.records);
        let record = ParticipantRecord {
            meeting_id: room.room_id.clone(),
            user_id: ctx.user_id.clone(),
            email: ctx.email.clone(),
            name: ctx.display.clone(),
            session_id: ctx.session_id.clone(),
            is_host,
            join_time: Utc::now(),
            leave_time: None,
        };
        spawn_persist("record-join", async move {
            records.record_join(&record).await
        });
    }

    pub fn handle_chat(&self, ctx: &SessionContext, message: String) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        let msg = outbound(
            msg_types::CHAT_MESSAGE,
            &ChatBroadcastPayload {
                sender: ctx.email.clone(),
                message,
                timestamp: Utc::now().to_rfc3339(),
            },
        );
        for peer in room.peer_senders_excluding(&ctx.session_id) {
            let _ = peer.send(msg.clone());
        }
    }

    pub fn handle_emoji(&self, ctx: &SessionContext, emoji: String) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        let msg = outbound(
            msg_types::EMOJI_REACTION,
            &EmojiBroadcastPayload {
                session_id: ctx.session_id.clone(),
                emoji,
            },
        );
        for peer in room.peer_senders_excluding(&ctx.session_id) {
            let _ = peer.send(msg.clone());
        }
    }

    pub fn handle_request_screenshare(&self, ctx: &SessionContext) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        match room.request_screenshare(&ctx.session_id) {
            ShareRequest::Denied => {
                let _ = ctx.sender.send(outbound(
                    msg_types::SCREENSHARE_APPROVED,
                    &ScreenshareApprovedPayload {
                        approved: false,
                        reason: Some(
                            "Someone else is already sharing their screen in this meeting"
                                .to_string(),
                        ),
                    },
                ));
            }
            ShareRequest::ForwardToHost { host_sender } => {
                let _ = host_sender.send(outbound(
                    msg_types::SCREENSHARE_REQUESTED,
                    &ScreenshareRequestedPayload {
                        session_id: ctx.session_id.clone(),
                        email: ctx.email.clone(),
                    },
                ));
            }
            ShareRequest::AutoApproved => {
                let _ = ctx.sender.send(outbound(
                    msg_types::SCREENSHARE_APPROVED,
                    &ScreenshareApprovedPayload {
                        approved: true,
                        reason: None,
                    },
                ));
            }
        }
    }

    pub fn handle_screenshare_response(
        &self,
        ctx: &SessionContext,
        payload: ScreenshareResponsePayload,
    ) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        if room.host_session_id().as_deref() != Some(ctx.session_id.as_str()) {
            tracing::warn!(
                session_id = %ctx.session_id,
                "screenshare-response from non-host ignored"
            );
            return;
        }
        if let Some(target) = room.sender_of(&payload.target_session_id) {
            let _ = target.send(outbound(
                msg_types::SCREENSHARE_APPROVED,
                &ScreenshareApprovedPayload {
                    approved: payload.approved,
                    reason: None,
                },
            ));
        }
    }

    pub fn handle_screenshare_state(&self, ctx: &SessionContext, is_sharing: bool) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        match room.set_screenshare(&ctx.session_id, is_sharing) {
            ShareStateChange::Changed => {
                let msg = outbound(
                    msg_types::SCREENSHARE_STATE_CHANGED,
                    &ScreenshareStateChangedPayload {
                        session_id: ctx.session_id.clone(),
                        is_sharing,
                    },
                );
                for peer in room.peer_senders_excluding(&ctx.session_id) {
                    let _ = peer.send(msg.clone());
                }
            }
            ShareStateChange::Rejected => {
                tracing::warn!(
                    room_id = %room.room_id,
                    session_id = %ctx.session_id,
                    is_sharing,
                    "screenshare-state rejected, slot held elsewhere"
                );
            }
        }
    }

    /// transfer-host: voluntary handoff to a random remaining session
    pub fn handle_transfer_host(&self, ctx: &SessionContext) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        match room.random_transfer_host(&ctx.session_id, &*self.picker) {
            Ok(transfer) => self.complete_transfer(&room.room_id, transfer),
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = ?e, "transfer-host refused");
            }
        }
    }

    pub fn handle_manual_transfer_host(
        &self,
        ctx: &SessionContext,
        payload: ManualTransferHostPayload,
    ) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        match room.manual_transfer_host(&ctx.session_id, &payload.target_session_id) {
            Ok(transfer) => self.complete_transfer(&room.room_id, transfer),
            Err(e) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    target = %payload.target_session_id,
                    error = ?e,
                    "manual-transfer-host refused"
                );
            }
        }
    }

    fn complete_transfer(&self, room_id: &str, transfer: host::HostTransfer) {
        let _ = transfer.to_sender.send(outbound(
            msg_types::YOU_ARE_NEW_HOST,
            &serde_json::json!({}),
        ));
        tracing::info!(
            room_id = %room_id,
            new_host = %transfer.to_session_id,
            "Host transferred"
        );

        let records = Arc::clone(&self.records);
        let meeting_id = room_id.to_string();
        let from_user = transfer.from_user_id;
        let to_user = transfer.to_user_id;
        spawn_persist("record-host-transfer", async move {
            records
                .record_host_transfer(&meeting_id, &from_user, &to_user)
                .await
        });
    }

    /// end-meeting: forced end by the host. Everyone else is notified once;
    /// the room is marked ended and subsequent joins are rejected.
    pub fn handle_end_meeting(&self, ctx: &SessionContext) {
        let Some(room) = self.joined_room(ctx) else {
            return;
        };
        let Some(others) = room.end_meeting(&ctx.session_id) else {
            tracing::warn!(session_id = %ctx.session_id, "end-meeting from non-host ignored");
            return;
        };

        let msg = outbound(msg_types::MEETING_FORCE_ENDED, &serde_json::json!({}));
        for peer in &others {
            let _ = peer.send(msg.clone());
        }
        tracing::info!(room_id = %room.room_id, "Meeting force-ended by host");

        let directory = Arc::clone(&self.directory);
        let meeting_id = room.room_id.clone();
        spawn_persist("end-meeting", async move {
            directory.end_meeting(&meeting_id).await
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeetingMeta;
    use crate::signaling::host::FixedPicker;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct StaticDirectory {
        meetings: Mutex<HashMap<String, MeetingMeta>>,
    }

    impl StaticDirectory {
        fn with(ids: &[(&str, &str)]) -> Self {
            let mut meetings = HashMap::new();
            for (id, creator) in ids {
                let mut meta = MeetingMeta::new(
                    format!("{} meeting", id),
                    creator.to_string(),
                    format!("{}@example.com", creator),
                );
                meta.meeting_id = id.to_string();
                meetings.insert(id.to_string(), meta);
            }
            Self {
                meetings: Mutex::new(meetings),
            }
        }

        fn status_of(&self, id: &str) -> Option<MeetingStatus> {
            self.meetings
                .lock()
                .unwrap()
                .get(id)
                .map(|meeting| meeting.status)
        }
    }

    #[async_trait]
    impl MeetingDirectory for StaticDirectory {
        async fn find_meeting(&self, meeting_id: &str) -> crate::error::Result<Option<MeetingMeta>> {
            Ok(self.meetings.lock().unwrap().get(meeting_id).cloned())
        }

        async fn activate_meeting(&self, meeting_id: &str) -> crate::error::Result<()> {
            if let Some(meeting) = self.meetings.lock().unwrap().get_mut(meeting_id) {
                meeting.status = MeetingStatus::Active;
            }
            Ok(())
        }

        async fn end_meeting(&self, meeting_id: &str) -> crate::error::Result<()> {
            if let Some(meeting) = self.meetings.lock().unwrap().get_mut(meeting_id) {
                meeting.status = MeetingStatus::Ended;
            }
            Ok(())
        }
    }

    struct NullSink;

    #[async_trait]
    impl RecordSink for NullSink {
        async fn record_join(&self, _record: &ParticipantRecord) -> crate::error::Result<()> {
            Ok(())
        }
        async fn record_leave(&self, _meeting_id: &str, _user_id: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn record_host_transfer(
            &self,
            _meeting_id: &str,
            _from_user_id: &str,
            _to_user_id: &str,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn service_with(
        directory: StaticDirectory,
        pick: usize,
    ) -> (Arc<SignalingService>, Arc<StaticDirectory>) {
        let directory = Arc::new(directory);
        let service = Arc::new(SignalingService::new(
            Arc::clone(&directory) as Arc<dyn MeetingDirectory>,
            Arc::new(NullSink),
            Arc::new(FixedPicker(pick)),
            Duration::from_millis(10_000),
        ));
        (service, directory)
    }

    fn claims(user_id: &str) -> Claims {
        Claims {
            sub: user_id.to_string(),
            name: format!("{} name", user_id),
            email: format!("{}@example.com", user_id),
            iat: 0,
            exp: i64::MAX,
        }
    }

    async fn join(
        service: &Arc<SignalingService>,
        meeting_id: &str,
        user_id: &str,
    ) -> (SessionContext, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut ctx = service.connect(&claims(user_id), tx);
        service.handle_join(&mut ctx, meeting_id).await;
        (ctx, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SignalingMessage>) -> Vec<SignalingMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn count_of(msgs: &[SignalingMessage], msg_type: &str) -> usize {
        msgs.iter().filter(|m| m.msg_type == msg_type).count()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn creator_joins_as_host_and_presence_is_asymmetric() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let first = drain(&mut rx_a);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].msg_type, msg_types::EXISTING_PEERS);
        assert_eq!(first[0].payload["peerIds"], serde_json::json!([]));

        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.host_session_id(), Some(ctx_a.session_id.clone()));

        let (ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        let to_b = drain(&mut rx_b);
        assert_eq!(to_b[0].msg_type, msg_types::EXISTING_PEERS);
        assert_eq!(
            to_b[0].payload["peerIds"],
            serde_json::json!([ctx_a.session_id])
        );

        let to_a = drain(&mut rx_a);
        assert_eq!(count_of(&to_a, msg_types::NEW_PEER), 1);
        assert_eq!(count_of(&to_a, msg_types::PEER_INFO), 1);
        assert_eq!(to_a[0].payload["sessionId"], ctx_b.session_id.as_str());
    }

    #[tokio::test]
    async fn join_unknown_meeting_creates_no_session() {
        let (service, _) = service_with(StaticDirectory::with(&[]), 0);

        let (ctx, mut rx) = join(&service, "missing", "alice").await;
        let msgs = drain(&mut rx);

        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].msg_type, msg_types::JOIN_ERROR);
        assert!(ctx.room_id.is_none());
        assert!(service.rooms().get("missing").is_none());
    }

    #[tokio::test]
    async fn join_ended_meeting_is_rejected() {
        let directory = StaticDirectory::with(&[("m1", "creator")]);
        directory
            .meetings
            .lock()
            .unwrap()
            .get_mut("m1")
            .unwrap()
            .status = MeetingStatus::Ended;
        let (service, _) = service_with(directory, 0);

        let (ctx, mut rx) = join(&service, "m1", "alice").await;
        let msgs = drain(&mut rx);

        assert_eq!(msgs[0].msg_type, msg_types::JOIN_ERROR);
        assert_eq!(msgs[0].payload["error"], "Meeting has ended");
        assert!(ctx.room_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_is_invisible() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (_ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let (mut ctx_b, _rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_a);

        Arc::clone(&service).handle_disconnect(&mut ctx_b);
        // Let the spawned timer register its sleep before moving the clock.
        settle().await;
        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;

        // Same user reconnects and rejoins before expiry.
        let (_ctx_b2, mut rx_b2) = join(&service, "m1", "bob").await;

        tokio::time::advance(Duration::from_millis(20_000)).await;
        settle().await;

        let to_a = drain(&mut rx_a);
        assert_eq!(count_of(&to_a, msg_types::PEER_DISCONNECTED), 0);
        // The room still holds exactly one live session per user.
        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.session_count(), 2);
        assert_eq!(drain(&mut rx_b2).len(), 1); // existing-peers only
    }

    #[tokio::test(start_paused = true)]
    async fn grace_expiry_broadcasts_exactly_one_disconnect() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (_ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let (mut ctx_b, _rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_a);

        Arc::clone(&service).handle_disconnect(&mut ctx_b);
        settle().await;
        tokio::time::advance(Duration::from_millis(10_001)).await;
        settle().await;

        let to_a = drain(&mut rx_a);
        assert_eq!(count_of(&to_a, msg_types::PEER_DISCONNECTED), 1);
        assert_eq!(to_a[0].payload["sessionId"], ctx_b.session_id.as_str());

        let room = service.rooms().get("m1").expect("room persists");
        assert_eq!(room.session_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn host_grace_expiry_elects_exactly_one_new_host() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (mut ctx_h, _rx_h) = join(&service, "m1", "creator").await;
        let (ctx_p1, mut rx_p1) = join(&service, "m1", "p1").await;
        let (_ctx_p2, mut rx_p2) = join(&service, "m1", "p2").await;
        drain(&mut rx_p1);
        drain(&mut rx_p2);

        Arc::clone(&service).handle_disconnect(&mut ctx_h);
        settle().await;
        tokio::time::advance(Duration::from_millis(10_001)).await;
        settle().await;

        let to_p1 = drain(&mut rx_p1);
        let to_p2 = drain(&mut rx_p2);
        let elections = count_of(&to_p1, msg_types::YOU_ARE_NEW_HOST)
            + count_of(&to_p2, msg_types::YOU_ARE_NEW_HOST);
        assert_eq!(elections, 1);
        // FixedPicker(0) elects the first remaining session in join order.
        assert_eq!(count_of(&to_p1, msg_types::YOU_ARE_NEW_HOST), 1);

        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.host_session_id(), Some(ctx_p1.session_id));
    }

    #[tokio::test(start_paused = true)]
    async fn forced_end_then_host_disconnect_elects_nobody() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (mut ctx_h, _rx_h) = join(&service, "m1", "creator").await;
        let (_ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_b);

        service.handle_end_meeting(&ctx_h);
        Arc::clone(&service).handle_disconnect(&mut ctx_h);
        settle().await;
        tokio::time::advance(Duration::from_millis(10_001)).await;
        settle().await;

        let to_b = drain(&mut rx_b);
        assert_eq!(count_of(&to_b, msg_types::MEETING_FORCE_ENDED), 1);
        assert_eq!(count_of(&to_b, msg_types::YOU_ARE_NEW_HOST), 0);

        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.host_session_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_finalize_releases_screenshare_slot() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (_ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let (mut ctx_b, _rx_b) = join(&service, "m1", "bob").await;
        service.handle_screenshare_state(&ctx_b, true);
        drain(&mut rx_a);

        Arc::clone(&service).handle_disconnect(&mut ctx_b);
        settle().await;
        tokio::time::advance(Duration::from_millis(10_001)).await;
        settle().await;

        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.screenshare_holder(), None);

        let to_a = drain(&mut rx_a);
        assert_eq!(count_of(&to_a, msg_types::PEER_DISCONNECTED), 1);
        let release = to_a
            .iter()
            .find(|m| m.msg_type == msg_types::SCREENSHARE_STATE_CHANGED)
            .expect("slot release broadcast");
        assert_eq!(release.payload["isSharing"], false);
    }

    #[tokio::test]
    async fn occupied_slot_request_is_denied_without_host_involvement() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (_ctx_host, mut rx_host) = join(&service, "m1", "creator").await;
        let (ctx_d, _rx_d) = join(&service, "m1", "d").await;
        let (ctx_c, mut rx_c) = join(&service, "m1", "c").await;
        service.handle_screenshare_state(&ctx_d, true);
        drain(&mut rx_host);
        drain(&mut rx_c);

        service.handle_request_screenshare(&ctx_c);

        let to_c = drain(&mut rx_c);
        assert_eq!(to_c.len(), 1);
        assert_eq!(to_c[0].msg_type, msg_types::SCREENSHARE_APPROVED);
        assert_eq!(to_c[0].payload["approved"], false);
        assert_eq!(count_of(&drain(&mut rx_host), msg_types::SCREENSHARE_REQUESTED), 0);
    }

    #[tokio::test]
    async fn free_slot_request_reaches_host_and_decision_routes_back() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_host, mut rx_host) = join(&service, "m1", "creator").await;
        let (ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_host);
        drain(&mut rx_b);

        service.handle_request_screenshare(&ctx_b);
        let to_host = drain(&mut rx_host);
        assert_eq!(to_host.len(), 1);
        assert_eq!(to_host[0].msg_type, msg_types::SCREENSHARE_REQUESTED);
        assert_eq!(to_host[0].payload["sessionId"], ctx_b.session_id.as_str());

        service.handle_screenshare_response(
            &ctx_host,
            ScreenshareResponsePayload {
                target_session_id: ctx_b.session_id.clone(),
                approved: true,
            },
        );
        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].msg_type, msg_types::SCREENSHARE_APPROVED);
        assert_eq!(to_b[0].payload["approved"], true);
    }

    #[tokio::test]
    async fn screenshare_response_from_non_host_is_ignored() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (_ctx_host, _rx_host) = join(&service, "m1", "creator").await;
        let (ctx_b, _rx_b) = join(&service, "m1", "bob").await;
        let (ctx_c, mut rx_c) = join(&service, "m1", "carol").await;
        drain(&mut rx_c);

        service.handle_screenshare_response(
            &ctx_b,
            ScreenshareResponsePayload {
                target_session_id: ctx_c.session_id.clone(),
                approved: true,
            },
        );

        assert_eq!(drain(&mut rx_c).len(), 0);
    }

    #[tokio::test]
    async fn end_meeting_notifies_every_other_session_once() {
        let (service, directory) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_host, _rx_host) = join(&service, "m1", "creator").await;
        let (_ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        let (_ctx_c, mut rx_c) = join(&service, "m1", "carol").await;
        drain(&mut rx_b);
        drain(&mut rx_c);

        service.handle_end_meeting(&ctx_host);
        settle().await;

        for rx in [&mut rx_b, &mut rx_c] {
            let msgs = drain(rx);
            assert_eq!(count_of(&msgs, msg_types::MEETING_FORCE_ENDED), 1);
        }
        let room = service.rooms().get("m1").expect("room exists");
        assert!(room.is_ended());
        assert_eq!(directory.status_of("m1"), Some(MeetingStatus::Ended));
    }

    #[tokio::test]
    async fn manual_transfer_notifies_target() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_host, _rx_host) = join(&service, "m1", "creator").await;
        let (ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_b);

        service.handle_manual_transfer_host(
            &ctx_host,
            ManualTransferHostPayload {
                target_session_id: ctx_b.session_id.clone(),
            },
        );

        let to_b = drain(&mut rx_b);
        assert_eq!(count_of(&to_b, msg_types::YOU_ARE_NEW_HOST), 1);
        let room = service.rooms().get("m1").expect("room exists");
        assert_eq!(room.host_session_id(), Some(ctx_b.session_id));
    }

    #[tokio::test]
    async fn host_info_reannounces_identity_to_peers() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let (_ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.handle_host_info(&ctx_a);

        assert_eq!(drain(&mut rx_a).len(), 0);
        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].msg_type, msg_types::PEER_INFO);
        assert_eq!(to_b[0].payload["sessionId"], ctx_a.session_id.as_str());
        assert_eq!(to_b[0].payload["email"], "creator@example.com");
    }

    #[tokio::test]
    async fn media_state_is_broadcast_to_peers_only() {
        let (service, _) = service_with(StaticDirectory::with(&[("m1", "creator")]), 0);

        let (ctx_a, mut rx_a) = join(&service, "m1", "creator").await;
        let (_ctx_b, mut rx_b) = join(&service, "m1", "bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        service.handle_media_state(
            &ctx_a,
            MediaStatePayload {
                video: false,
                audio: true,
            },
        );

        assert_eq!(drain(&mut rx_a).len(), 0);
        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].msg_type, msg_types::PEER_MEDIA_STATE);
        assert_eq!(to_b[0].payload["video"], false);
        assert_eq!(to_b[0].payload["audio"], true);
    }
}
