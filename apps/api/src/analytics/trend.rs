use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::error;

use crate::models::completion::CompletionStamp;
use crate::store::ProgressStore;

pub const DEFAULT_TREND_DAYS: i64 = 7;
pub const MAX_TREND_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionTrendPoint {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub completions: usize,
}

pub fn trend_window_start(days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// Buckets completions into `days + 1` UTC calendar days ending today.
/// Every bucket is seeded to zero; completions outside the window are ignored.
pub fn bucket_completions(
    days: i64,
    now: DateTime<Utc>,
    completions: &[CompletionStamp],
) -> Vec<CompletionTrendPoint> {
    let start = trend_window_start(days, now);
    let mut buckets: BTreeMap<NaiveDate, usize> = (0..=days)
        .map(|i| ((start + Duration::days(i)).date_naive(), 0))
        .collect();

    for stamp in completions.iter().filter(|s| s.completed_at >= start) {
        if let Some(count) = buckets.get_mut(&stamp.completed_at.date_naive()) {
            *count += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(date, completions)| CompletionTrendPoint {
            date: date.format("%Y-%m-%d").to_string(),
            completions,
        })
        .collect()
}

/// Empty on store failure.
pub async fn completion_trend(
    store: &dyn ProgressStore,
    days: i64,
    now: DateTime<Utc>,
) -> Vec<CompletionTrendPoint> {
    let start = trend_window_start(days, now);
    match store.finished_completions(Some(start)).await {
        Ok(stamps) => bucket_completions(days, now, &stamps),
        Err(e) => {
            error!("Completion trend query failed: {e}");
            Vec::new()
        }
    }
}
