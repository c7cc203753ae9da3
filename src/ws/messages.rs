use serde::{Deserialize, Serialize};

/// Wrapper for all WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl SignalingMessage {
    pub fn new(msg_type: &str, payload: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            payload,
        }
    }

    pub fn join_error(error: &str) -> Self {
        Self::new(
            msg_types::JOIN_ERROR,
            serde_json::json!({ "error": error }),
        )
    }
}

// ==================== Client -> Server Messages ====================

/// join-meeting payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMeetingPayload {
    #[serde(alias = "roomId")]
    pub meeting_id: String,
}

/// offer / answer / ice-candidate inbound payload. The negotiation payload
/// itself is opaque; the server never inspects it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayInPayload {
    pub target_session_id: String,
    pub payload: serde_json::Value,
}

/// media-state payload
#[derive(Debug, Clone, Deserialize)]
pub struct MediaStatePayload {
    pub video: bool,
    pub audio: bool,
}

/// chat-message payload
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessagePayload {
    pub message: String,
}

/// emoji-reaction payload
#[derive(Debug, Clone, Deserialize)]
pub struct EmojiReactionPayload {
    pub emoji: String,
}

/// screenshare-response payload (host decision)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshareResponsePayload {
    pub target_session_id: String,
    pub approved: bool,
}

/// screenshare-state payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshareStatePayload {
    pub is_sharing: bool,
}

/// manual-transfer-host payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTransferHostPayload {
    pub target_session_id: String,
}

// ==================== Server -> Client Messages ====================

/// existing-peers payload, sent to the joiner only. The joiner initiates
/// negotiation toward every id listed; existing peers never offer first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingPeersPayload {
    pub peer_ids: Vec<String>,
}

/// new-peer payload, sent to each existing peer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeerPayload {
    pub session_id: String,
}

/// peer-info payload: identity for rendering before negotiation completes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfoPayload {
    pub session_id: String,
    pub display_name: String,
    pub email: String,
}

/// offer / answer / ice-candidate outbound payload, tagged with the sender
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOutPayload {
    pub from_session_id: String,
    pub payload: serde_json::Value,
}

/// peer-media-state payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMediaStatePayload {
    pub session_id: String,
    pub video: bool,
    pub audio: bool,
}

/// chat-message broadcast payload
#[derive(Debug, Clone, Serialize)]
pub struct ChatBroadcastPayload {
    pub sender: String,
    pub message: String,
    pub timestamp: String,
}

/// emoji-reaction broadcast payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiBroadcastPayload {
    pub session_id: String,
    pub emoji: String,
}

/// screenshare-requested payload: the approval prompt delivered to the host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshareRequestedPayload {
    pub session_id: String,
    pub email: String,
}

/// screenshare-approved payload
#[derive(Debug, Clone, Serialize)]
pub struct ScreenshareApprovedPayload {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// screenshare-state-changed payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshareStateChangedPayload {
    pub session_id: String,
    pub is_sharing: bool,
}

/// peer-disconnected payload, sent once per departure after the grace
/// period expires without a reconnect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDisconnectedPayload {
    pub session_id: String,
}

/// Message types for matching
pub mod msg_types {
    // Client -> Server
    pub const JOIN_MEETING: &str = "join-meeting";
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    pub const MEDIA_STATE: &str = "media-state";
    pub const HOST_INFO: &str = "host-info";
    pub const CHAT_MESSAGE: &str = "chat-message";
    pub const EMOJI_REACTION: &str = "emoji-reaction";
    pub const REQUEST_SCREENSHARE: &str = "request-screenshare";
    pub const SCREENSHARE_RESPONSE: &str = "screenshare-response";
    pub const SCREENSHARE_STATE: &str = "screenshare-state";
    pub const TRANSFER_HOST: &str = "transfer-host";
    pub const MANUAL_TRANSFER_HOST: &str = "manual-transfer-host";
    pub const END_MEETING: &str = "end-meeting";

    // Server -> Client
    pub const EXISTING_PEERS: &str = "existing-peers";
    pub const NEW_PEER: &str = "new-peer";
    pub const PEER_INFO: &str = "peer-info";
    pub const PEER_MEDIA_STATE: &str = "peer-media-state";
    pub const SCREENSHARE_REQUESTED: &str = "screenshare-requested";
    pub const SCREENSHARE_APPROVED: &str = "screenshare-approved";
    pub const SCREENSHARE_STATE_CHANGED: &str = "screenshare-state-changed";
    pub const YOU_ARE_NEW_HOST: &str = "you-are-new-host";
    pub const MEETING_FORCE_ENDED: &str = "meeting-force-ended";
    pub const PEER_DISCONNECTED: &str = "peer-disconnected";
    pub const JOIN_ERROR: &str = "join-error";
}
