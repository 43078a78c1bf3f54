use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::completion::{CompletionRow, CompletionStamp, ProgressUpdate};
use crate::models::learner::{LearnerProfile, LEARNER_ROLE};
use crate::models::reminder::{NewReminderLog, ReminderLogRow, ReminderSettingRow};
use crate::models::topic::{ProductRow, TopicRow, TopicUpsert};
use crate::progression::tracker;
use crate::store::{ProgressStore, StoreError, TopicEdges};

const TOPIC_SELECT: &str = r#"
    SELECT t.id, t.product_id, p.code AS product_code, p.name AS product_name,
           t.position, t.title, t.description, t.duration_minutes,
           t.prerequisites, t.content, t.published, t.created_at
    FROM topics t
    JOIN products p ON p.id = t.product_id
"#;

/// sqlx-backed store over the shared Postgres pool.
#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn list_products(&self) -> Result<Vec<ProductRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ProductRow>("SELECT id, code, name FROM products ORDER BY code")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn published_topics(
        &self,
        product_code: Option<&str>,
    ) -> Result<Vec<TopicRow>, StoreError> {
        let sql = format!(
            "{TOPIC_SELECT} WHERE t.published = TRUE AND ($1::text IS NULL OR p.code = $1) \
             ORDER BY t.position ASC, t.id ASC"
        );
        Ok(sqlx::query_as::<_, TopicRow>(&sql)
            .bind(product_code)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn published_topic(&self, topic_id: Uuid) -> Result<Option<TopicRow>, StoreError> {
        let sql = format!("{TOPIC_SELECT} WHERE t.id = $1 AND t.published = TRUE");
        Ok(sqlx::query_as::<_, TopicRow>(&sql)
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn topic_graph(&self) -> Result<Vec<TopicEdges>, StoreError> {
        Ok(
            sqlx::query_as::<_, TopicEdges>("SELECT id, prerequisites FROM topics")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn upsert_topics(
        &self,
        topics: &[TopicUpsert],
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for topic in topics {
            let result = sqlx::query(
                r#"
                INSERT INTO topics
                    (id, product_id, position, title, description, duration_minutes,
                     prerequisites, content, published, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO UPDATE SET
                    product_id = EXCLUDED.product_id,
                    position = EXCLUDED.position,
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    duration_minutes = EXCLUDED.duration_minutes,
                    prerequisites = EXCLUDED.prerequisites,
                    content = EXCLUDED.content,
                    published = EXCLUDED.published,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(topic.id)
            .bind(topic.product_id)
            .bind(topic.position)
            .bind(&topic.title)
            .bind(&topic.description)
            .bind(topic.duration_minutes)
            .bind(&topic.prerequisites)
            .bind(Json(&topic.content))
            .bind(topic.published)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!("Upserted {written} topics");
        Ok(written)
    }

    async fn user_completions(&self, user_id: Uuid) -> Result<Vec<CompletionRow>, StoreError> {
        Ok(sqlx::query_as::<_, CompletionRow>(
            r#"
            SELECT id, user_id, topic_id, started_at, completed_at, completion_percentage,
                   time_spent_seconds, video_progress_seconds, updated_at
            FROM topic_completions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_started(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let row = tracker::started_row(user_id, topic_id, now);
        let result = sqlx::query(
            r#"
            INSERT INTO topic_completions
                (id, user_id, topic_id, started_at, completion_percentage,
                 time_spent_seconds, video_progress_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, topic_id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(row.topic_id)
        .bind(row.started_at)
        .bind(row.completion_percentage)
        .bind(row.time_spent_seconds)
        .bind(row.video_progress_seconds)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_progress(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<CompletionRow, StoreError> {
        // The insert half is the fresh-row transition; the update half
        // mirrors tracker::apply_progress in one statement so two concurrent
        // pings for the same pair cannot lose each other's time.
        let fresh = tracker::apply_progress(None, user_id, topic_id, update, now);
        let row = sqlx::query_as::<_, CompletionRow>(
            r#"
            INSERT INTO topic_completions
                (id, user_id, topic_id, started_at, completed_at, completion_percentage,
                 time_spent_seconds, video_progress_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, topic_id) DO UPDATE SET
                completion_percentage = GREATEST(topic_completions.completion_percentage,
                                                 EXCLUDED.completion_percentage),
                time_spent_seconds = topic_completions.time_spent_seconds
                                     + EXCLUDED.time_spent_seconds,
                video_progress_seconds = COALESCE($10::int, topic_completions.video_progress_seconds),
                completed_at = COALESCE(topic_completions.completed_at, EXCLUDED.completed_at),
                updated_at = EXCLUDED.updated_at
            RETURNING id, user_id, topic_id, started_at, completed_at, completion_percentage,
                      time_spent_seconds, video_progress_seconds, updated_at
            "#,
        )
        .bind(fresh.id)
        .bind(fresh.user_id)
        .bind(fresh.topic_id)
        .bind(fresh.started_at)
        .bind(fresh.completed_at)
        .bind(fresh.completion_percentage)
        .bind(fresh.time_spent_seconds)
        .bind(fresh.video_progress_seconds)
        .bind(fresh.updated_at)
        .bind(update.video_progress_seconds)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "Progress for user {user_id} topic {topic_id}: {}%",
            row.completion_percentage
        );
        Ok(row)
    }

    async fn finished_completions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CompletionStamp>, StoreError> {
        Ok(sqlx::query_as::<_, CompletionStamp>(
            r#"
            SELECT user_id, completed_at
            FROM topic_completions
            WHERE completed_at IS NOT NULL
              AND ($1::timestamptz IS NULL OR completed_at >= $1)
            ORDER BY completed_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn finished_completions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<CompletionStamp>, StoreError> {
        Ok(sqlx::query_as::<_, CompletionStamp>(
            r#"
            SELECT user_id, completed_at
            FROM topic_completions
            WHERE completed_at IS NOT NULL AND user_id = ANY($1)
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn learner_profiles(&self) -> Result<Vec<LearnerProfile>, StoreError> {
        Ok(sqlx::query_as::<_, LearnerProfile>(
            "SELECT id, first_name, email, role, created_at FROM user_profiles \
             WHERE role = $1 ORDER BY created_at ASC",
        )
        .bind(LEARNER_ROLE)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<LearnerProfile>, StoreError> {
        Ok(sqlx::query_as::<_, LearnerProfile>(
            "SELECT id, first_name, email, role, created_at FROM user_profiles WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn opted_in_settings(&self) -> Result<Vec<ReminderSettingRow>, StoreError> {
        Ok(sqlx::query_as::<_, ReminderSettingRow>(
            "SELECT user_id, opted_in, last_opt_in_at, updated_at \
             FROM learner_reminder_settings WHERE opted_in = TRUE",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn reminder_setting(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ReminderSettingRow>, StoreError> {
        Ok(sqlx::query_as::<_, ReminderSettingRow>(
            "SELECT user_id, opted_in, last_opt_in_at, updated_at \
             FROM learner_reminder_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_reminder_setting(
        &self,
        setting: &ReminderSettingRow,
    ) -> Result<ReminderSettingRow, StoreError> {
        Ok(sqlx::query_as::<_, ReminderSettingRow>(
            r#"
            INSERT INTO learner_reminder_settings (user_id, opted_in, last_opt_in_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                opted_in = EXCLUDED.opted_in,
                last_opt_in_at = EXCLUDED.last_opt_in_at,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, opted_in, last_opt_in_at, updated_at
            "#,
        )
        .bind(setting.user_id)
        .bind(setting.opted_in)
        .bind(setting.last_opt_in_at)
        .bind(setting.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delivered_reminders_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReminderLogRow>, StoreError> {
        Ok(sqlx::query_as::<_, ReminderLogRow>(
            r#"
            SELECT id, user_id, reminder_type, delivered_at, notes, created_at
            FROM learner_reminder_logs
            WHERE delivered_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_reminder_log(
        &self,
        log: &NewReminderLog,
        now: DateTime<Utc>,
    ) -> Result<ReminderLogRow, StoreError> {
        Ok(sqlx::query_as::<_, ReminderLogRow>(
            r#"
            INSERT INTO learner_reminder_logs (user_id, reminder_type, delivered_at, notes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, reminder_type, delivered_at, notes, created_at
            "#,
        )
        .bind(log.user_id)
        .bind(log.reminder_type)
        .bind(log.delivered_at)
        .bind(&log.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }
}
