use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

pub const STALLED_LEARNER_REMINDER: &str = "stalled_learner";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReminderSettingRow {
    pub user_id: Uuid,
    pub opted_in: bool,
    pub last_opt_in_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only dispatch record. `delivered_at` is null for failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReminderLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reminder_type: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminderLog {
    pub user_id: Uuid,
    pub reminder_type: &'static str,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Value,
}
