//! In-memory `ProgressStore` used by unit and router tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::completion::{CompletionRow, CompletionStamp, ProgressUpdate};
use crate::models::learner::{LearnerProfile, LEARNER_ROLE};
use crate::models::reminder::{NewReminderLog, ReminderLogRow, ReminderSettingRow};
use crate::models::topic::{ProductRow, TopicContent, TopicRow, TopicUpsert};
use crate::progression::tracker;
use crate::store::{ProgressStore, StoreError, TopicEdges};

#[derive(Default)]
struct State {
    products: Vec<ProductRow>,
    topics: Vec<TopicRow>,
    profiles: Vec<LearnerProfile>,
    completions: Vec<CompletionRow>,
    settings: Vec<ReminderSettingRow>,
    logs: Vec<ReminderLogRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing: AtomicBool,
    failing_completion_reads: AtomicBool,
    failing_log_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_completion_reads(&self, failing: bool) {
        self.failing_completion_reads.store(failing, Ordering::SeqCst);
    }

    pub fn fail_log_writes(&self, failing: bool) {
        self.failing_log_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected("injected failure"));
        }
        Ok(())
    }

    pub fn add_product(&self, code: &str, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().products.push(ProductRow {
            id,
            code: code.to_string(),
            name: name.to_string(),
        });
        id
    }

    pub fn add_topic(
        &self,
        product_id: Uuid,
        position: i32,
        title: &str,
        prerequisites: Vec<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        let product = state
            .products
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .expect("product must be added before its topics");
        state.topics.push(TopicRow {
            id,
            product_id,
            product_code: product.code,
            product_name: product.name,
            position,
            title: title.to_string(),
            description: None,
            duration_minutes: 30,
            prerequisites,
            content: Json(TopicContent::default()),
            published: true,
            created_at: Utc::now(),
        });
        id
    }

    pub fn set_published(&self, topic_id: Uuid, published: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(topic) = state.topics.iter_mut().find(|t| t.id == topic_id) {
            topic.published = published;
        }
    }

    pub fn topics(&self) -> Vec<TopicRow> {
        self.state.lock().unwrap().topics.clone()
    }

    pub fn add_profile(&self, created_at: DateTime<Utc>, email: Option<&str>, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().profiles.push(LearnerProfile {
            id,
            first_name: Some("Sam".to_string()),
            email: email.map(str::to_string),
            role: role.to_string(),
            created_at,
        });
        id
    }

    pub fn add_learner(&self, created_at: DateTime<Utc>, email: Option<&str>) -> Uuid {
        self.add_profile(created_at, email, LEARNER_ROLE)
    }

    /// Drives the row to 100% at `at` through the same transition the tracker uses.
    pub fn complete(&self, user_id: Uuid, topic_id: Uuid, at: DateTime<Utc>) {
        let update = ProgressUpdate {
            completion_percentage: 100,
            time_spent_seconds: 60,
            video_progress_seconds: None,
        };
        self.upsert_progress(user_id, topic_id, update, at);
    }

    pub fn opt_in(&self, user_id: Uuid, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.settings.retain(|s| s.user_id != user_id);
        state.settings.push(ReminderSettingRow {
            user_id,
            opted_in: true,
            last_opt_in_at: Some(at),
            updated_at: at,
        });
    }

    pub fn logs(&self) -> Vec<ReminderLogRow> {
        self.state.lock().unwrap().logs.clone()
    }

    fn upsert_progress(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> CompletionRow {
        let mut state = self.state.lock().unwrap();
        let position = state
            .completions
            .iter()
            .position(|c| c.user_id == user_id && c.topic_id == topic_id);
        let existing = position.map(|i| &state.completions[i]);
        let row = tracker::apply_progress(existing, user_id, topic_id, update, now);
        match position {
            Some(i) => state.completions[i] = row.clone(),
            None => state.completions.push(row.clone()),
        }
        row
    }

    fn stamps(&self, keep: impl Fn(&CompletionRow) -> bool) -> Vec<CompletionStamp> {
        let state = self.state.lock().unwrap();
        let mut stamps: Vec<CompletionStamp> = state
            .completions
            .iter()
            .filter(|c| keep(c))
            .filter_map(|c| {
                c.completed_at.map(|completed_at| CompletionStamp {
                    user_id: c.user_id,
                    completed_at,
                })
            })
            .collect();
        stamps.sort_by_key(|s| s.completed_at);
        stamps
    }
}

fn injected(reason: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(reason.to_string()))
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<ProductRow>, StoreError> {
        self.check()?;
        Ok(self.state.lock().unwrap().products.clone())
    }

    async fn published_topics(
        &self,
        product_code: Option<&str>,
    ) -> Result<Vec<TopicRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut topics: Vec<TopicRow> = state
            .topics
            .iter()
            .filter(|t| t.published)
            .filter(|t| product_code.map_or(true, |code| t.product_code == code))
            .cloned()
            .collect();
        topics.sort_by_key(|t| (t.position, t.id));
        Ok(topics)
    }

    async fn published_topic(&self, topic_id: Uuid) -> Result<Option<TopicRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .topics
            .iter()
            .find(|t| t.id == topic_id && t.published)
            .cloned())
    }

    async fn topic_graph(&self) -> Result<Vec<TopicEdges>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .topics
            .iter()
            .map(|t| TopicEdges {
                id: t.id,
                prerequisites: t.prerequisites.clone(),
            })
            .collect())
    }

    async fn upsert_topics(
        &self,
        topics: &[TopicUpsert],
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        for topic in topics {
            let product = state
                .products
                .iter()
                .find(|p| p.id == topic.product_id)
                .cloned()
                .ok_or_else(|| injected("unknown product"))?;
            let row = TopicRow {
                id: topic.id,
                product_id: topic.product_id,
                product_code: product.code,
                product_name: product.name,
                position: topic.position,
                title: topic.title.clone(),
                description: topic.description.clone(),
                duration_minutes: topic.duration_minutes,
                prerequisites: topic.prerequisites.clone(),
                content: Json(topic.content.clone()),
                published: topic.published,
                created_at: now,
            };
            match state.topics.iter().position(|t| t.id == topic.id) {
                Some(i) => {
                    let created_at = state.topics[i].created_at;
                    state.topics[i] = TopicRow { created_at, ..row };
                }
                None => state.topics.push(row),
            }
        }
        Ok(topics.len() as u64)
    }

    async fn user_completions(&self, user_id: Uuid) -> Result<Vec<CompletionRow>, StoreError> {
        self.check()?;
        if self.failing_completion_reads.load(Ordering::SeqCst) {
            return Err(injected("completion reads disabled"));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_started(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if state
            .completions
            .iter()
            .any(|c| c.user_id == user_id && c.topic_id == topic_id)
        {
            return Ok(false);
        }
        state
            .completions
            .push(tracker::started_row(user_id, topic_id, now));
        Ok(true)
    }

    async fn apply_progress(
        &self,
        user_id: Uuid,
        topic_id: Uuid,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<CompletionRow, StoreError> {
        self.check()?;
        Ok(self.upsert_progress(user_id, topic_id, update, now))
    }

    async fn finished_completions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CompletionStamp>, StoreError> {
        self.check()?;
        Ok(self.stamps(|c| match (since, c.completed_at) {
            (Some(since), Some(at)) => at >= since,
            _ => true,
        }))
    }

    async fn finished_completions_for(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<CompletionStamp>, StoreError> {
        self.check()?;
        let mut stamps = self.stamps(|c| user_ids.contains(&c.user_id));
        stamps.reverse();
        Ok(stamps)
    }

    async fn learner_profiles(&self) -> Result<Vec<LearnerProfile>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.role == LEARNER_ROLE)
            .cloned()
            .collect())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<LearnerProfile>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn opted_in_settings(&self) -> Result<Vec<ReminderSettingRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.settings.iter().filter(|s| s.opted_in).cloned().collect())
    }

    async fn reminder_setting(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ReminderSettingRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.settings.iter().find(|s| s.user_id == user_id).cloned())
    }

    async fn upsert_reminder_setting(
        &self,
        setting: &ReminderSettingRow,
    ) -> Result<ReminderSettingRow, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.settings.retain(|s| s.user_id != setting.user_id);
        state.settings.push(setting.clone());
        Ok(setting.clone())
    }

    async fn delivered_reminders_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReminderLogRow>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|l| l.delivered_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }

    async fn insert_reminder_log(
        &self,
        log: &NewReminderLog,
        now: DateTime<Utc>,
    ) -> Result<ReminderLogRow, StoreError> {
        self.check()?;
        if self.failing_log_writes.load(Ordering::SeqCst) {
            return Err(injected("log writes disabled"));
        }
        let row = ReminderLogRow {
            id: Uuid::new_v4(),
            user_id: log.user_id,
            reminder_type: log.reminder_type.to_string(),
            delivered_at: log.delivered_at,
            notes: log.notes.clone(),
            created_at: now,
        };
        self.state.lock().unwrap().logs.push(row.clone());
        Ok(row)
    }
}
