pub mod meeting_repository;

pub use meeting_repository::MeetingRepository;

use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{MeetingMeta, ParticipantRecord};

/// Create a Redis connection pool
pub fn create_pool(config: &Config) -> Result<Pool> {
    let redis_config = RedisConfig::from_url(&config.redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::PersistenceError(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}

/// Meeting existence/status lookup consumed by the signaling layer.
///
/// Whether a meeting exists (and has not ended) is an external precondition
/// checked at join time; the room registry itself never validates it.
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    async fn find_meeting(&self, meeting_id: &str) -> Result<Option<MeetingMeta>>;

    /// Flip a scheduled meeting to active when the first participant arrives.
    async fn activate_meeting(&self, meeting_id: &str) -> Result<()>;

    /// Mark a meeting ended (forced end by the host).
    async fn end_meeting(&self, meeting_id: &str) -> Result<()>;
}

/// Best-effort sink for join/leave/host-transfer records.
///
/// Writes are fired from the signaling path without being awaited; a failed
/// write is logged and never blocks or rolls back room state.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn record_join(&self, record: &ParticipantRecord) -> Result<()>;

    async fn record_leave(&self, meeting_id: &str, user_id: &str) -> Result<()>;

    async fn record_host_transfer(
        &self,
        meeting_id: &str,
        from_user_id: &str,
        to_user_id: &str,
    ) -> Result<()>;
}
