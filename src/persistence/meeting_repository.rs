use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::{MeetingMeta, MeetingStatus, ParticipantRecord};
use crate::persistence::{MeetingDirectory, RecordSink};

/// Redis-backed meeting repository
#[derive(Clone)]
pub struct MeetingRepository {
    pool: Pool,
    ttl_seconds: u64,
}

impl MeetingRepository {
    pub fn new(pool: Pool, ttl_seconds: u64) -> Self {
        Self { pool, ttl_seconds }
    }

    fn meeting_key(meeting_id: &str) -> String {
        format!("meeting:{}", meeting_id)
    }

    fn participants_key(meeting_id: &str) -> String {
        format!("meeting:{}:participants", meeting_id)
    }

    /// Redis connectivity check for the health endpoint
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(pong == "PONG")
    }

    // ==================== Meeting Operations ====================

    /// Create a new meeting with TTL
    pub async fn create_meeting(&self, meeting: &MeetingMeta) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let key = Self::meeting_key(&meeting.meeting_id);
        let json = serde_json::to_string(meeting)?;

        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.ttl_seconds as i64)
            .arg(&json)
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::info!(meeting_id = %meeting.meeting_id, "Meeting created");
        Ok(())
    }

    /// Get meeting metadata by ID
    pub async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingMeta>> {
        let mut conn = self.pool.get().await?;
        let json: Option<String> = conn.get(Self::meeting_key(meeting_id)).await?;

        match json {
            Some(data) => {
                let meeting: MeetingMeta = serde_json::from_str(&data)?;
                Ok(Some(meeting))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, meeting_id: &str, status: MeetingStatus) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let key = Self::meeting_key(meeting_id);

        let json: Option<String> = conn.get(&key).await?;
        let Some(data) = json else {
            // Meeting expired out of Redis; nothing to update.
            return Ok(());
        };

        let mut meeting: MeetingMeta = serde_json::from_str(&data)?;
        meeting.status = status;
        if status == MeetingStatus::Ended {
            meeting.ended_at = Some(Utc::now());
        }

        let updated = serde_json::to_string(&meeting)?;
        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.ttl_seconds as i64)
            .arg(&updated)
            .query_async::<()>(&mut *conn)
            .await?;

        Ok(())
    }

    // ==================== Participant Records ====================

    /// List participant records for a meeting
    pub async fn get_participants(&self, meeting_id: &str) -> Result<Vec<ParticipantRecord>> {
        let mut conn = self.pool.get().await?;
        let entries: Vec<(String, String)> = conn.hgetall(Self::participants_key(meeting_id)).await?;

        let mut records = Vec::with_capacity(entries.len());
        for (_, json) in entries {
            if let Ok(record) = serde_json::from_str::<ParticipantRecord>(&json) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl MeetingDirectory for MeetingRepository {
    async fn find_meeting(&self, meeting_id: &str) -> Result<Option<MeetingMeta>> {
        self.get_meeting(meeting_id).await
    }

    async fn activate_meeting(&self, meeting_id: &str) -> Result<()> {
        self.update_status(meeting_id, MeetingStatus::Active).await?;
        tracing::info!(meeting_id = %meeting_id, "Meeting activated");
        Ok(())
    }

    async fn end_meeting(&self, meeting_id: &str) -> Result<()> {
        self.update_status(meeting_id, MeetingStatus::Ended).await?;
        tracing::info!(meeting_id = %meeting_id, "Meeting marked ended");
        Ok(())
    }
}

#[async_trait]
impl RecordSink for MeetingRepository {
    async fn record_join(&self, record: &ParticipantRecord) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let key = Self::participants_key(&record.meeting_id);
        let json = serde_json::to_string(record)?;

        conn.hset::<_, _, _, ()>(&key, &record.user_id, &json).await?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_seconds as i64)
            .query_async::<()>(&mut *conn)
            .await?;

        Ok(())
    }

    async fn record_leave(&self, meeting_id: &str, user_id: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let key = Self::participants_key(meeting_id);

        let json: Option<String> = conn.hget(&key, user_id).await?;
        let Some(data) = json else {
            return Ok(());
        };

        let mut record: ParticipantRecord = serde_json::from_str(&data)?;
        record.leave_time = Some(Utc::now());

        let updated = serde_json::to_string(&record)?;
        conn.hset::<_, _, _, ()>(&key, user_id, &updated).await?;

        Ok(())
    }

    async fn record_host_transfer(
        &self,
        meeting_id: &str,
        from_user_id: &str,
        to_user_id: &str,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let key = Self::participants_key(meeting_id);

        for (user_id, is_host) in [(from_user_id, false), (to_user_id, true)] {
            let json: Option<String> = conn.hget(&key, user_id).await?;
            if let Some(data) = json {
                let mut record: ParticipantRecord = serde_json::from_str(&data)?;
                record.is_host = is_host;
                let updated = serde_json::to_string(&record)?;
                conn.hset::<_, _, _, ()>(&key, user_id, &updated).await?;
            }
        }

        Ok(())
    }
}
