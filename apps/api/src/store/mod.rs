//! Persistence seam for the progression engine.
//!
//! Every domain module talks to `dyn ProgressStore`; production wires in
//! `PgProgressStore`, tests wire in `MemoryStore`. The store holds no
//! application logic beyond what each call's SQL needs to stay atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::models::completion::{CompletionRow, CompletionStamp, ProgressUpdate};
use crate::models::learner::LearnerProfile;
use crate::models::reminder::{NewReminderLog, ReminderLogRow, ReminderSettingRow};
use crate::models::topic::{ProductRow, TopicRow, TopicUpsert};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Prerequisite edges of one topic, published or not.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TopicEdges {
    pub id: Uuid,
    pub prerequisites: Vec<Uuid>,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn list_products(&self) -> Result<Vec<ProductRow>, StoreError>;

    /// Published topics ordered by `position`, optionally limited to one product code.
    async fn published_topics(
        &self,
        product_code: Option<&str>,
    ) -> Result<Vec<TopicRow>, StoreError>;

    async fn published_topic(&self, topic_id: Uuid) -> Result<Option<TopicRow>, StoreError>;

    async fn topic_graph(&self) -> Result<Vec<TopicEdges>, StoreError>;

    /// Upserts by id inside one transaction. Returns the number of rows written.
    async fn upsert_topics(
        &self,
        topics: &[TopicUpsert],
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn user_completions(&self, user_id: Uuid) -> Result<Vec<CompletionRow>, StoreError>;

    /// Inserts a started row unless one already exists. Returns whether a row was inserted.
    async fn insert_started(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Single atomic upsert: monotonic percentage, additive time, sticky `completed_at`.
    async fn apply_progress(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<CompletionRow, StoreError>;

    /// Completions with non-null `completed_at`, optionally at or after `since`.
    async fn finished_completions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CompletionStamp>, StoreError>;

    async fn finished_completions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<CompletionStamp>, StoreError>;

    /// Profiles with the ordinary learner role.
    async fn learner_profiles(&self) -> Result<Vec<LearnerProfile>, StoreError>;

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<LearnerProfile>, StoreError>;

    async fn opted_in_settings(&self) -> Result<Vec<ReminderSettingRow>, StoreError>;

    async fn reminder_setting(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ReminderSettingRow>, StoreError>;

    async fn upsert_reminder_setting(
        &self,
        setting: &ReminderSettingRow,
    ) -> Result<ReminderSettingRow, StoreError>;

    /// Log rows with `delivered_at >= since`. Failed attempts never match.
    async fn delivered_reminders_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReminderLogRow>, StoreError>;

    async fn insert_reminder_log(
        &self,
        log: &NewReminderLog,
        now: DateTime<Utc>,
    ) -> Result<ReminderLogRow, StoreError>;
}
