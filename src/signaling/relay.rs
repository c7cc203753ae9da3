use crate::signaling::registry::MeetingRoom;
use crate::ws::messages::{RelayInPayload, RelayOutPayload, SignalingMessage};

/// Forward one negotiation envelope (offer / answer / ice-candidate)
/// point-to-point. The payload passes through verbatim, tagged with the
/// sender's session id so the recipient can reply. A target that already
/// departed is expected under concurrency and dropped silently.
pub fn relay(room: &MeetingRoom, kind: &str, from_session_id: &str, envelope: RelayInPayload) {
    match room.sender_of(&envelope.target_session_id) {
        Some(target) => {
            let msg = SignalingMessage::new(
                kind,
                serde_json::to_value(RelayOutPayload {
                    from_session_id: from_session_id.to_string(),
                    payload: envelope.payload,
                })
                .unwrap_or(serde_json::Value::Null),
            );
            let _ = target.send(msg);
        }
        None => {
            tracing::debug!(
                room_id = %room.room_id,
                kind = %kind,
                target = %envelope.target_session_id,
                "Dropping relay to vanished session"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::registry::{MeetingRoom, ParticipantSession};
    use crate::ws::messages::msg_types;
    use tokio::sync::mpsc;

    #[test]
    fn relay_forwards_payload_verbatim_tagged_with_sender() {
        let room = MeetingRoom::new("m1".to_string());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        for (sid, uid, tx) in [("a", "u1", tx_a), ("b", "u2", tx_b)] {
            room.add_session(
                ParticipantSession::new(
                    sid.to_string(),
                    uid.to_string(),
                    uid.to_string(),
                    format!("{}@example.com", uid),
                    tx,
                ),
                false,
            );
        }

        let sdp = serde_json::json!({"type": "offer", "sdp": "v=0\r\n..."});
        relay(
            &room,
            msg_types::OFFER,
            "a",
            RelayInPayload {
                target_session_id: "b".to_string(),
                payload: sdp.clone(),
            },
        );

        let msg = rx_b.try_recv().expect("delivered");
        assert_eq!(msg.msg_type, msg_types::OFFER);
        assert_eq!(msg.payload["fromSessionId"], "a");
        assert_eq!(msg.payload["payload"], sdp);
    }

    #[test]
    fn relay_to_vanished_target_is_dropped_silently() {
        let room = MeetingRoom::new("m1".to_string());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        room.add_session(
            ParticipantSession::new(
                "a".to_string(),
                "u1".to_string(),
                "u1".to_string(),
                "u1@example.com".to_string(),
                tx_a,
            ),
            false,
        );

        relay(
            &room,
            msg_types::ICE_CANDIDATE,
            "a",
            RelayInPayload {
                target_session_id: "gone".to_string(),
                payload: serde_json::json!({"candidate": "..."}),
            },
        );

        // Nothing is surfaced to the sender.
        assert!(rx_a.try_recv().is_err());
    }
}
