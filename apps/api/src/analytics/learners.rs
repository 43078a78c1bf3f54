use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{hours_between, round_to};
use crate::errors::AppError;
use crate::models::completion::CompletionStamp;
use crate::models::learner::LearnerProfile;
use crate::models::reminder::ReminderLogRow;
use crate::store::ProgressStore;

const DELIVERY_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerActivity {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub signup_date: DateTime<Utc>,
    pub first_completion_date: Option<DateTime<Utc>>,
    pub hours_to_first_completion: Option<f64>,
    pub topics_completed: usize,
    pub last_completion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerActivityReport {
    pub learners: Vec<LearnerActivity>,
    pub reminders_delivered_last_7_days: usize,
}

#[derive(Default)]
struct Tally {
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    count: usize,
}

/// One row per learner, oldest signup first.
pub fn learner_activity(
    profiles: &[LearnerProfile],
    completions: &[CompletionStamp],
) -> Vec<LearnerActivity> {
    let mut tallies: HashMap<Uuid, Tally> = HashMap::new();
    for stamp in completions {
        let tally = tallies.entry(stamp.user_id).or_default();
        let at = stamp.completed_at;
        tally.count += 1;
        tally.first = Some(tally.first.map_or(at, |f| f.min(at)));
        tally.last = Some(tally.last.map_or(at, |l| l.max(at)));
    }

    let mut rows: Vec<LearnerActivity> = profiles
        .iter()
        .map(|profile| {
            let tally = tallies.get(&profile.id);
            let first = tally.and_then(|t| t.first);
            LearnerActivity {
                user_id: profile.id,
                email: profile.email.clone(),
                first_name: profile.first_name.clone(),
                signup_date: profile.created_at,
                first_completion_date: first,
                hours_to_first_completion: first
                    .map(|at| round_to(hours_between(profile.created_at, at).max(0.0), 1)),
                topics_completed: tally.map_or(0, |t| t.count),
                last_completion_date: tally.and_then(|t| t.last),
            }
        })
        .collect();
    rows.sort_by_key(|r| (r.signup_date, r.user_id));
    rows
}

fn delivered_count(logs: &[ReminderLogRow]) -> usize {
    logs.iter().filter(|l| l.delivered_at.is_some()).count()
}

pub async fn learner_activity_report(
    store: &dyn ProgressStore,
    now: DateTime<Utc>,
) -> Result<LearnerActivityReport, AppError> {
    let profiles = store.learner_profiles().await?;
    let completions = store.finished_completions(None).await?;
    let logs = store
        .delivered_reminders_since(now - Duration::days(DELIVERY_LOOKBACK_DAYS))
        .await?;

    Ok(LearnerActivityReport {
        learners: learner_activity(&profiles, &completions),
        reminders_delivered_last_7_days: delivered_count(&logs),
    })
}
