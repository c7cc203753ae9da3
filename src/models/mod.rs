pub mod meeting;
pub mod user;

pub use meeting::{
    CreateMeetingRequest, CreateMeetingResponse, MeetingMeta, MeetingStatus, ParticipantRecord,
};
pub use user::Claims;
