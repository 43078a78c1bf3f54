use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per (user, topic). `completed_at` is terminal once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CompletionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_percentage: i32,
    pub time_spent_seconds: i64,
    pub video_progress_seconds: i32,
    pub updated_at: DateTime<Utc>,
}

impl CompletionRow {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Slim projection of a finished completion used by analytics and reminders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CompletionStamp {
    pub user_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub completion_percentage: i32,
    pub time_spent_seconds: i64,
    pub video_progress_seconds: Option<i32>,
}
