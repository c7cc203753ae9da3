use crate::signaling::registry::{JoinSnapshot, OutboundSender};
use crate::ws::messages::{
    msg_types, ExistingPeersPayload, NewPeerPayload, PeerDisconnectedPayload, PeerInfoPayload,
    SignalingMessage,
};

fn message<T: serde::Serialize>(msg_type: &str, payload: &T) -> SignalingMessage {
    SignalingMessage::new(
        msg_type,
        serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
    )
}

/// Announce a join with the glare-avoidance asymmetry: the joiner learns
/// every existing peer and initiates negotiation toward each of them;
/// existing peers only learn that a new peer arrived and never offer first.
pub fn announce_join(
    joiner_sender: &OutboundSender,
    session_id: &str,
    display: &str,
    email: &str,
    snapshot: &JoinSnapshot,
) {
    let _ = joiner_sender.send(message(
        msg_types::EXISTING_PEERS,
        &ExistingPeersPayload {
            peer_ids: snapshot.peer_ids.clone(),
        },
    ));

    let new_peer = message(
        msg_types::NEW_PEER,
        &NewPeerPayload {
            session_id: session_id.to_string(),
        },
    );
    let peer_info = message(
        msg_types::PEER_INFO,
        &PeerInfoPayload {
            session_id: session_id.to_string(),
            display_name: display.to_string(),
            email: email.to_string(),
        },
    );

    for peer in &snapshot.peers {
        let _ = peer.send(new_peer.clone());
        let _ = peer.send(peer_info.clone());
    }
}

/// Announce a finalized departure: one `peer-disconnected` per departing
/// session, fanned out to whoever remains.
pub fn announce_leave(remaining: &[OutboundSender], session_id: &str) {
    let departed = message(
        msg_types::PEER_DISCONNECTED,
        &PeerDisconnectedPayload {
            session_id: session_id.to_string(),
        },
    );
    for peer in remaining {
        let _ = peer.send(departed.clone());
    }
}
