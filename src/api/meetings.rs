use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{
    Claims, CreateMeetingRequest, CreateMeetingResponse, MeetingMeta, ParticipantRecord,
};
use crate::state::AppState;

/// Meeting routes
pub fn meeting_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_meeting))
        .route("/{meeting_id}", get(get_meeting))
        .route("/{meeting_id}/participants", get(get_participants))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    state.auth.validate_bearer(header)
}

/// POST /api/v1/meetings - Create a meeting; the caller becomes its creator
/// and takes the host pointer when joining.
async fn create_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateMeetingRequest>,
) -> Result<Json<CreateMeetingResponse>> {
    let claims = authenticate(&state, &headers)?;

    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("Meeting name is required".to_string()));
    }

    let meeting = MeetingMeta::new(request.name.trim().to_string(), claims.sub, claims.email);
    state.meetings.create_meeting(&meeting).await?;

    Ok(Json(meeting.into()))
}

/// Meeting detail with the caller's host relationship
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetailResponse {
    pub meeting: MeetingMeta,
    pub is_host: bool,
}

/// GET /api/v1/meetings/{meeting_id}
async fn get_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(meeting_id): Path<String>,
) -> Result<Json<MeetingDetailResponse>> {
    let claims = authenticate(&state, &headers)?;

    let meeting = state
        .meetings
        .get_meeting(&meeting_id)
        .await?
        .ok_or_else(|| AppError::MeetingNotFound(meeting_id))?;

    let is_host = meeting.created_by == claims.sub;
    Ok(Json(MeetingDetailResponse { meeting, is_host }))
}

/// Participant list response
#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub count: usize,
    pub participants: Vec<ParticipantRecord>,
}

/// GET /api/v1/meetings/{meeting_id}/participants
async fn get_participants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(meeting_id): Path<String>,
) -> Result<Json<ParticipantsResponse>> {
    authenticate(&state, &headers)?;

    let participants = state.meetings.get_participants(&meeting_id).await?;
    Ok(Json(ParticipantsResponse {
        count: participants.len(),
        participants,
    }))
}
