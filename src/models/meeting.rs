use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Meeting metadata stored in Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingMeta {
    pub meeting_id: String,
    pub name: String,
    pub status: MeetingStatus,
    /// User id of the creator; the creating identity takes the host
    /// pointer when it joins an unhosted room.
    pub created_by: String,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MeetingMeta {
    pub fn new(name: String, created_by: String, created_by_email: String) -> Self {
        Self {
            meeting_id: uuid::Uuid::new_v4().to_string(),
            name,
            // Flips to Active when the first participant joins.
            status: MeetingStatus::Scheduled,
            created_by,
            created_by_email,
            created_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Meeting status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Active,
    Ended,
}

/// Participant join/leave record, written best-effort on room events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub meeting_id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub session_id: String,
    pub is_host: bool,
    pub join_time: DateTime<Utc>,
    pub leave_time: Option<DateTime<Utc>>,
}

/// Request to create a meeting
#[derive(Debug, Deserialize)]
pub struct CreateMeetingRequest {
    pub name: String,
}

/// Response after creating a meeting
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingResponse {
    pub meeting_id: String,
    pub name: String,
    pub status: MeetingStatus,
    pub created_at: DateTime<Utc>,
}

impl From<MeetingMeta> for CreateMeetingResponse {
    fn from(meeting: MeetingMeta) -> Self {
        Self {
            meeting_id: meeting.meeting_id,
            name: meeting.name,
            status: meeting.status,
            created_at: meeting.created_at,
        }
    }
}
