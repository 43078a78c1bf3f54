//! Cohort activation metrics for the admin dashboard.
//!
//! The stalled count here is computed independently of the dispatcher's
//! eligibility check. Both read the same threshold, but the dashboard does not
//! look at email addresses or the delivery log.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::analytics::{hours_between, round_to};
use crate::models::completion::CompletionStamp;
use crate::models::learner::LearnerProfile;
use crate::models::reminder::ReminderSettingRow;
use crate::store::{ProgressStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationMetrics {
    pub total_learners: usize,
    pub active_learners: usize,
    pub average_topics_per_active_learner: f64,
    pub median_time_to_first_completion_hours: Option<f64>,
    /// Fraction in 0..=1, not a percentage.
    pub reminder_opt_in_rate: f64,
    pub stalled_learners: usize,
}

/// Median with the even/odd midpoint rule. Even-length midpoints are rounded
/// to one decimal.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(round_to((sorted[middle - 1] + sorted[middle]) / 2.0, 1))
    } else {
        Some(sorted[middle])
    }
}

/// Completion instants per user, ascending.
fn completions_by_user(completions: &[CompletionStamp]) -> HashMap<Uuid, Vec<DateTime<Utc>>> {
    let mut map: HashMap<Uuid, Vec<DateTime<Utc>>> = HashMap::new();
    for stamp in completions {
        map.entry(stamp.user_id).or_default().push(stamp.completed_at);
    }
    for list in map.values_mut() {
        list.sort();
    }
    map
}

pub fn compute_activation_metrics(
    profiles: &[LearnerProfile],
    completions: &[CompletionStamp],
    opted_in: &[ReminderSettingRow],
    threshold_hours: i64,
    now: DateTime<Utc>,
) -> ActivationMetrics {
    let by_user = completions_by_user(completions);
    let total_learners = profiles.len();

    let mut active_learners = 0usize;
    let mut topics_completed = 0usize;
    let mut first_completion_hours = Vec::new();
    // Completions by non-learner profiles (admins) are not counted as activity.
    for profile in profiles {
        let Some(list) = by_user.get(&profile.id).filter(|l| !l.is_empty()) else {
            continue;
        };
        active_learners += 1;
        topics_completed += list.len();
        let hours = hours_between(profile.created_at, list[0]).round().max(0.0);
        first_completion_hours.push(hours);
    }

    let average_topics_per_active_learner = if active_learners == 0 {
        0.0
    } else {
        round_to(topics_completed as f64 / active_learners as f64, 2)
    };

    let reminder_opt_in_rate = if total_learners == 0 {
        0.0
    } else {
        round_to(opted_in.len() as f64 / total_learners as f64, 2)
    };

    let opted_in_ids: HashSet<Uuid> = opted_in.iter().map(|s| s.user_id).collect();
    let stalled_learners = profiles
        .iter()
        .filter(|p| opted_in_ids.contains(&p.id))
        .filter(|p| {
            let last_progress = by_user
                .get(&p.id)
                .and_then(|l| l.last().copied())
                .unwrap_or(p.created_at);
            let hours_since = (now - last_progress).num_milliseconds().div_euclid(3_600_000);
            hours_since >= threshold_hours
        })
        .count();

    ActivationMetrics {
        total_learners,
        active_learners,
        average_topics_per_active_learner,
        median_time_to_first_completion_hours: median(&first_completion_hours),
        reminder_opt_in_rate,
        stalled_learners,
    }
}

async fn load_and_compute(
    store: &dyn ProgressStore,
    threshold_hours: i64,
    now: DateTime<Utc>,
) -> Result<ActivationMetrics, StoreError> {
    let profiles = store.learner_profiles().await?;
    let completions = store.finished_completions(None).await?;
    let opted_in = store.opted_in_settings().await?;
    Ok(compute_activation_metrics(
        &profiles,
        &completions,
        &opted_in,
        threshold_hours,
        now,
    ))
}

/// Never fails: any store error yields the all-zero metrics.
pub async fn activation_metrics(
    store: &dyn ProgressStore,
    threshold_hours: i64,
    now: DateTime<Utc>,
) -> ActivationMetrics {
    match load_and_compute(store, threshold_hours, now).await {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Activation metrics query failed: {e}");
            ActivationMetrics::default()
        }
    }
}
