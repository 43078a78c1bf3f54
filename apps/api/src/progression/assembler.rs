//! Per-learner topic views.
//!
//! Completions are loaded once per request and every topic is gated in
//! memory against that lookup, so listing costs two queries regardless of
//! catalog size.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::completion::CompletionRow;
use crate::models::topic::TopicRow;
use crate::progression::resolver::{completion_lookup, evaluate_gate, Gate};
use crate::store::ProgressStore;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub id: Uuid,
    pub completion_percentage: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: i64,
    pub video_progress_seconds: i32,
}

impl From<&CompletionRow> for CompletionSummary {
    fn from(row: &CompletionRow) -> Self {
        Self {
            id: row.id,
            completion_percentage: row.completion_percentage,
            completed_at: row.completed_at,
            time_spent_seconds: row.time_spent_seconds,
            video_progress_seconds: row.video_progress_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicView {
    #[serde(flatten)]
    pub topic: TopicRow,
    pub completion: Option<CompletionSummary>,
    pub prerequisites_met: bool,
    pub is_locked: bool,
}

impl TopicView {
    fn closed(topic: TopicRow) -> Self {
        Self {
            topic,
            completion: None,
            prerequisites_met: Gate::CLOSED.prerequisites_met,
            is_locked: Gate::CLOSED.is_locked,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion
            .as_ref()
            .is_some_and(|c| c.completed_at.is_some())
    }
}

/// Joins topics with one learner's completions. `None` means anonymous:
/// everything is locked and carries no completion.
pub fn assemble(topics: Vec<TopicRow>, completions: Option<&[CompletionRow]>) -> Vec<TopicView> {
    let Some(completions) = completions else {
        return topics.into_iter().map(TopicView::closed).collect();
    };

    let lookup = completion_lookup(completions);
    topics
        .into_iter()
        .map(|topic| {
            let gate = evaluate_gate(topic.id, &topic.prerequisites, &lookup);
            let completion = lookup.get(&topic.id).map(|c| CompletionSummary::from(*c));
            TopicView {
                topic,
                completion,
                prerequisites_met: gate.prerequisites_met,
                is_locked: gate.is_locked,
            }
        })
        .collect()
}

/// Loads a learner's completions, failing closed to "no learner" on error.
async fn learner_completions(
    store: &dyn ProgressStore,
    user_id: Option<Uuid>,
) -> Option<Vec<CompletionRow>> {
    let user_id = user_id?;
    match store.user_completions(user_id).await {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!("Could not load completions for user {user_id}, reporting topics locked: {e}");
            None
        }
    }
}

pub async fn list_topics(
    store: &dyn ProgressStore,
    product_code: Option<&str>,
    user_id: Option<Uuid>,
) -> Result<Vec<TopicView>, AppError> {
    let topics = store.published_topics(product_code).await?;
    if topics.is_empty() {
        return Ok(Vec::new());
    }
    let completions = learner_completions(store, user_id).await;
    Ok(assemble(topics, completions.as_deref()))
}

pub async fn get_topic(
    store: &dyn ProgressStore,
    topic_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<Option<TopicView>, AppError> {
    let Some(topic) = store.published_topic(topic_id).await? else {
        return Ok(None);
    };
    let completions = learner_completions(store, user_id).await;
    Ok(assemble(vec![topic], completions.as_deref()).into_iter().next())
}

/// First topic of the product, by position, that the learner can open and
/// has not finished yet.
pub async fn next_topic(
    store: &dyn ProgressStore,
    product_code: &str,
    user_id: Uuid,
) -> Result<Option<TopicView>, AppError> {
    let views = list_topics(store, Some(product_code), Some(user_id)).await?;
    Ok(views
        .into_iter()
        .find(|view| !view.is_locked && !view.is_completed()))
}
