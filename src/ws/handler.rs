use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::signaling::{SessionContext, SignalingService};
use crate::state::AppState;
use crate::ws::messages::{
    msg_types, ChatMessagePayload, EmojiReactionPayload, JoinMeetingPayload,
    ManualTransferHostPayload, MediaStatePayload, RelayInPayload, ScreenshareResponsePayload,
    ScreenshareStatePayload, SignalingMessage,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: String,
}

/// WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// WebSocket upgrade handler. A connection without a valid identity is
/// rejected here; no session is ever created for it.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Result<Response, AppError> {
    let claims = state.auth.validate_token(&params.token)?;

    tracing::info!(
        user_id = %claims.sub,
        display = %claims.name,
        "WebSocket upgrade request"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, claims: crate::models::Claims) {
    // One ordered outbound channel per connection; this is what preserves
    // per-sender relay ordering.
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();

    let mut ctx = state.signaling.connect(&claims, tx);

    tracing::info!(
        session_id = %ctx.session_id,
        user_id = %ctx.user_id,
        "WebSocket connected"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages to client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_message(&text, &mut ctx, &state.signaling).await {
                    // Operational failures stay out of the room; only
                    // join-error and screenshare denials reach the client.
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        error = %e,
                        "Error handling message"
                    );
                }
            }
            Ok(Message::Ping(_)) => {
                tracing::trace!(session_id = %ctx.session_id, "Ping received");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %ctx.session_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // The session is not torn down here: it enters the reconnect grace
    // period and the Session Manager finalizes the leave if no reconnect
    // with the same user id arrives in time.
    Arc::clone(&state.signaling).handle_disconnect(&mut ctx);

    send_task.abort();
}

/// Dispatch one inbound signaling event
async fn handle_message(
    text: &str,
    ctx: &mut SessionContext,
    service: &Arc<SignalingService>,
) -> Result<(), AppError> {
    let msg: SignalingMessage = serde_json::from_str(text)?;

    tracing::debug!(
        msg_type = %msg.msg_type,
        session_id = %ctx.session_id,
        "Received message"
    );

    match msg.msg_type.as_str() {
        msg_types::JOIN_MEETING => {
            let payload: JoinMeetingPayload = serde_json::from_value(msg.payload)?;
            service.handle_join(ctx, &payload.meeting_id).await;
        }
        msg_types::OFFER | msg_types::ANSWER | msg_types::ICE_CANDIDATE => {
            let envelope: RelayInPayload = serde_json::from_value(msg.payload)?;
            service.handle_relay(ctx, &msg.msg_type, envelope);
        }
        msg_types::MEDIA_STATE => {
            let payload: MediaStatePayload = serde_json::from_value(msg.payload)?;
            service.handle_media_state(ctx, payload);
        }
        msg_types::HOST_INFO => {
            service.handle_host_info(ctx);
        }
        msg_types::CHAT_MESSAGE => {
            let payload: ChatMessagePayload = serde_json::from_value(msg.payload)?;
            service.handle_chat(ctx, payload.message);
        }
        msg_types::EMOJI_REACTION => {
            let payload: EmojiReactionPayload = serde_json::from_value(msg.payload)?;
            service.handle_emoji(ctx, payload.emoji);
        }
        msg_types::REQUEST_SCREENSHARE => {
            service.handle_request_screenshare(ctx);
        }
        msg_types::SCREENSHARE_RESPONSE => {
            let payload: ScreenshareResponsePayload = serde_json::from_value(msg.payload)?;
            service.handle_screenshare_response(ctx, payload);
        }
        msg_types::SCREENSHARE_STATE => {
            let payload: ScreenshareStatePayload = serde_json::from_value(msg.payload)?;
            service.handle_screenshare_state(ctx, payload.is_sharing);
        }
        msg_types::TRANSFER_HOST => {
            service.handle_transfer_host(ctx);
        }
        msg_types::MANUAL_TRANSFER_HOST => {
            let payload: ManualTransferHostPayload = serde_json::from_value(msg.payload)?;
            service.handle_manual_transfer_host(ctx, payload);
        }
        msg_types::END_MEETING => {
            service.handle_end_meeting(ctx);
        }
        _ => {
            tracing::warn!(msg_type = %msg.msg_type, "Unknown message type");
        }
    }

    Ok(())
}
