//! Completion tracker.
//!
//! `apply_progress` is the reference transition for a (user, topic) row; the
//! Postgres store performs the same transition in a single upsert statement.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::completion::{CompletionRow, ProgressUpdate};
use crate::store::ProgressStore;

pub const COMPLETE_PERCENTAGE: i32 = 100;
/// Upper bound for the time reported by a single progress ping.
pub const MAX_TIME_PER_PING_SECONDS: i64 = 24 * 60 * 60;

/// Row created on first touch.
pub fn started_row(user_id: Uuid, topic_id: Uuid, now: DateTime<Utc>) -> CompletionRow {
    CompletionRow {
        id: Uuid::new_v4(),
        user_id,
        topic_id,
        started_at: now,
        completed_at: None,
        completion_percentage: 0,
        time_spent_seconds: 0,
        video_progress_seconds: 0,
        updated_at: now,
    }
}

/// Applies one progress ping to the current row (or to a fresh one).
///
/// - percentage never moves backwards
/// - time spent accumulates
/// - `completed_at` is stamped the first time 100 is reached and never cleared
pub fn apply_progress(
    existing: Option<&CompletionRow>,
    user_id: Uuid,
    topic_id: Uuid,
    update: ProgressUpdate,
    now: DateTime<Utc>,
) -> CompletionRow {
    let mut row = existing
        .cloned()
        .unwrap_or_else(|| started_row(user_id, topic_id, now));

    row.completion_percentage = row.completion_percentage.max(update.completion_percentage);
    row.time_spent_seconds += update.time_spent_seconds;
    if let Some(position) = update.video_progress_seconds {
        row.video_progress_seconds = position;
    }
    if row.completed_at.is_none() && update.completion_percentage >= COMPLETE_PERCENTAGE {
        row.completed_at = Some(now);
    }
    row.updated_at = now;
    row
}

/// Checks raw progress input before it reaches the store.
pub fn validate_progress(
    completion_percentage: i32,
    time_spent_seconds: i64,
    video_progress_seconds: Option<i32>,
) -> Result<ProgressUpdate, AppError> {
    if !(0..=COMPLETE_PERCENTAGE).contains(&completion_percentage) {
        return Err(AppError::Validation(format!(
            "completion_percentage must be between 0 and 100, got {completion_percentage}"
        )));
    }
    if time_spent_seconds < 0 {
        return Err(AppError::Validation(
            "time_spent_seconds cannot be negative".to_string(),
        ));
    }
    if time_spent_seconds > MAX_TIME_PER_PING_SECONDS {
        return Err(AppError::Validation(format!(
            "time_spent_seconds cannot exceed {MAX_TIME_PER_PING_SECONDS}, got {time_spent_seconds}"
        )));
    }
    if video_progress_seconds.is_some_and(|s| s < 0) {
        return Err(AppError::Validation(
            "video_progress_seconds cannot be negative".to_string(),
        ));
    }
    Ok(ProgressUpdate {
        completion_percentage,
        time_spent_seconds,
        video_progress_seconds,
    })
}

/// Idempotent first touch. Returns whether this call created the row.
pub async fn mark_started(
    store: &dyn ProgressStore,
    user_id: Uuid,
    topic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let created = store.insert_started(user_id, topic_id, now).await?;
    if created {
        info!("User {user_id} started topic {topic_id}");
    } else {
        debug!("User {user_id} already started topic {topic_id}");
    }
    Ok(created)
}

pub async fn update_progress(
    store: &dyn ProgressStore,
    user_id: Uuid,
    topic_id: Uuid,
    update: ProgressUpdate,
    now: DateTime<Utc>,
) -> Result<CompletionRow, AppError> {
    let row = store.apply_progress(user_id, topic_id, update, now).await?;
    if row.completed_at == Some(now) {
        info!("User {user_id} completed topic {topic_id}");
    }
    Ok(row)
}
