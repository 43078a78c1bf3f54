//! Stalled-learner reminder dispatch.
//!
//! One run walks every opted-in learner once, in order, and each learner ends
//! up skipped, sent or failed. Every attempted send writes exactly one log row.
//! Only delivered rows (non-null `delivered_at`) count toward the cooldown, so
//! a failed attempt is retried by the next run.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ReminderPolicy;
use crate::models::learner::LearnerProfile;
use crate::models::reminder::{NewReminderLog, STALLED_LEARNER_REMINDER};
use crate::reminders::email::{ReminderEmailPayload, ReminderMailer};
use crate::store::ProgressStore;

pub const PROVIDER_NOT_CONFIGURED: &str =
    "Reminder email provider is not configured. Set RESEND_API_KEY and REMINDER_EMAIL_FROM.";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderSummary {
    pub candidates: usize,
    pub attempts: usize,
    pub triggered: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingEmail,
    RecentProgress,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible {
        last_progress: DateTime<Utc>,
        hours_stalled: i64,
    },
    Skipped(SkipReason),
}

/// Instant of a learner's latest forward progress: newest completion, or
/// signup when nothing has been completed yet.
pub fn last_progress_instant(
    profile: &LearnerProfile,
    latest_completion: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    latest_completion.unwrap_or(profile.created_at)
}

pub fn evaluate_candidate(
    profile: &LearnerProfile,
    latest_completion: Option<DateTime<Utc>>,
    last_delivered: Option<DateTime<Utc>>,
    policy: ReminderPolicy,
    now: DateTime<Utc>,
) -> Eligibility {
    let last_progress = last_progress_instant(profile, latest_completion);

    if profile.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
        return Eligibility::Skipped(SkipReason::MissingEmail);
    }
    if last_progress > now - Duration::hours(policy.threshold_hours) {
        return Eligibility::Skipped(SkipReason::RecentProgress);
    }
    let cooldown_start = now - Duration::hours(policy.cooldown_hours);
    if last_delivered.is_some_and(|at| at >= cooldown_start) {
        return Eligibility::Skipped(SkipReason::CoolingDown);
    }

    Eligibility::Eligible {
        last_progress,
        hours_stalled: (now - last_progress).num_hours(),
    }
}

fn latest_by_user(
    stamps: impl IntoIterator<Item = (Uuid, DateTime<Utc>)>,
) -> HashMap<Uuid, DateTime<Utc>> {
    let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    for (user_id, at) in stamps {
        latest
            .entry(user_id)
            .and_modify(|current| *current = (*current).max(at))
            .or_insert(at);
    }
    latest
}

/// Runs one dispatch pass as of `now`.
///
/// Store failures before the candidate loop abort the run with the error in
/// the summary: without completions or the delivery log the cooldown cannot
/// be evaluated and nobody may be emailed.
pub async fn send_stalled_learner_reminders(
    store: &dyn ProgressStore,
    mailer: &dyn ReminderMailer,
    policy: ReminderPolicy,
    now: DateTime<Utc>,
) -> ReminderSummary {
    let mut summary = ReminderSummary::default();

    if !mailer.is_configured() {
        warn!("Reminder run aborted: email provider not configured");
        summary.errors.push(PROVIDER_NOT_CONFIGURED.to_string());
        return summary;
    }

    let settings = match store.opted_in_settings().await {
        Ok(rows) => rows,
        Err(e) => {
            summary.errors.push(e.to_string());
            return summary;
        }
    };
    if settings.is_empty() {
        return summary;
    }

    let user_ids: Vec<Uuid> = settings.iter().map(|s| s.user_id).collect();
    let profiles = match store.profiles_by_ids(&user_ids).await {
        Ok(rows) => rows,
        Err(e) => {
            summary.candidates = user_ids.len();
            summary.errors.push(e.to_string());
            return summary;
        }
    };
    let profiles: HashMap<Uuid, LearnerProfile> =
        profiles.into_iter().map(|p| (p.id, p)).collect();
    let candidates: Vec<&LearnerProfile> =
        user_ids.iter().filter_map(|id| profiles.get(id)).collect();
    summary.candidates = candidates.len();
    if candidates.is_empty() {
        return summary;
    }

    let latest_completion = match store.finished_completions_for(&user_ids).await {
        Ok(stamps) => latest_by_user(stamps.into_iter().map(|s| (s.user_id, s.completed_at))),
        Err(e) => {
            summary.errors.push(format!("Could not load completions: {e}"));
            return summary;
        }
    };

    let cooldown_start = now - Duration::hours(policy.cooldown_hours);
    let last_delivered = match store.delivered_reminders_since(cooldown_start).await {
        Ok(logs) => latest_by_user(
            logs.into_iter()
                .filter_map(|l| l.delivered_at.map(|at| (l.user_id, at))),
        ),
        Err(e) => {
            summary.errors.push(format!("Could not load reminder log: {e}"));
            return summary;
        }
    };

    for profile in candidates {
        let eligibility = evaluate_candidate(
            profile,
            latest_completion.get(&profile.id).copied(),
            last_delivered.get(&profile.id).copied(),
            policy,
            now,
        );
        let Eligibility::Eligible {
            last_progress,
            hours_stalled,
        } = eligibility
        else {
            summary.skipped += 1;
            continue;
        };
        // evaluate_candidate only admits profiles with an email.
        let Some(email) = profile.email.as_deref() else {
            summary.skipped += 1;
            continue;
        };

        summary.attempts += 1;
        let payload = ReminderEmailPayload {
            to: email,
            first_name: profile.first_name.as_deref(),
            hours_stalled,
            threshold_hours: policy.threshold_hours,
        };

        let log = match mailer.send_reminder(&payload).await {
            Ok(receipt) => {
                summary.triggered += 1;
                NewReminderLog {
                    user_id: profile.id,
                    reminder_type: STALLED_LEARNER_REMINDER,
                    delivered_at: Some(now),
                    notes: json!({
                        "status": "sent",
                        "email": email,
                        "provider_id": receipt.id,
                        "last_progress_at": last_progress,
                        "threshold_hours": policy.threshold_hours,
                        "attempted_at": now,
                    }),
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Reminder to {} failed: {message}", profile.id);
                summary
                    .errors
                    .push(format!("Failed to send reminder to {}: {message}", profile.id));
                NewReminderLog {
                    user_id: profile.id,
                    reminder_type: STALLED_LEARNER_REMINDER,
                    delivered_at: None,
                    notes: json!({
                        "status": "error",
                        "email": email,
                        "error": message,
                        "last_progress_at": last_progress,
                        "threshold_hours": policy.threshold_hours,
                        "attempted_at": now,
                    }),
                }
            }
        };

        if let Err(e) = store.insert_reminder_log(&log, now).await {
            let outcome = if log.delivered_at.is_some() {
                "Reminder sent but logging failed"
            } else {
                "Failed to record reminder error"
            };
            summary
                .errors
                .push(format!("{outcome} for {}: {e}", profile.id));
        }
    }

    info!(
        "Reminder run finished: candidates={} attempts={} triggered={} skipped={} errors={}",
        summary.candidates,
        summary.attempts,
        summary.triggered,
        summary.skipped,
        summary.errors.len()
    );
    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::reminders::email::{DeliveryReceipt, EmailError};
    use crate::store::memory::MemoryStore;

    /// Records every send; fails for addresses in `failing`.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub configured: bool,
        pub failing: Vec<String>,
        pub sent: Mutex<Vec<String>>,
    }

    impl RecordingMailer {
        pub fn configured() -> Self {
            Self {
                configured: true,
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReminderMailer for RecordingMailer {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn send_reminder(
            &self,
            payload: &ReminderEmailPayload<'_>,
        ) -> Result<DeliveryReceipt, EmailError> {
            if self.failing.iter().any(|f| f == payload.to) {
                return Err(EmailError::Api {
                    status: 500,
                    message: "provider down".to_string(),
                });
            }
            self.sent.lock().unwrap().push(payload.to.to_string());
            Ok(DeliveryReceipt {
                id: Some(format!("msg-{}", payload.to)),
            })
        }
    }

    fn profile(created_at: DateTime<Utc>, email: Option<&str>) -> LearnerProfile {
        LearnerProfile {
            id: Uuid::new_v4(),
            first_name: None,
            email: email.map(str::to_string),
            role: "user".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_never_completed_learner_measured_from_signup() {
        let now = Utc::now();
        let learner = profile(now - Duration::hours(49), Some("a@example.com"));
        let eligibility = evaluate_candidate(&learner, None, None, ReminderPolicy::default(), now);
        assert_eq!(
            eligibility,
            Eligibility::Eligible {
                last_progress: learner.created_at,
                hours_stalled: 49
            }
        );
    }

    #[test]
    fn test_skip_reasons() {
        let now = Utc::now();
        let policy = ReminderPolicy::default();
        let old = now - Duration::days(10);

        let no_email = profile(old, None);
        assert_eq!(
            evaluate_candidate(&no_email, None, None, policy, now),
            Eligibility::Skipped(SkipReason::MissingEmail)
        );

        let active = profile(old, Some("b@example.com"));
        assert_eq!(
            evaluate_candidate(&active, Some(now - Duration::hours(47)), None, policy, now),
            Eligibility::Skipped(SkipReason::RecentProgress)
        );

        assert_eq!(
            evaluate_candidate(&active, None, Some(now - Duration::hours(23)), policy, now),
            Eligibility::Skipped(SkipReason::CoolingDown)
        );
    }

    #[test]
    fn test_exact_threshold_and_cooldown_boundaries() {
        let now = Utc::now();
        let policy = ReminderPolicy::default();
        let learner = profile(now - Duration::days(10), Some("c@example.com"));

        let at_threshold = Some(now - Duration::hours(48));
        assert!(matches!(
            evaluate_candidate(&learner, at_threshold, None, policy, now),
            Eligibility::Eligible { .. }
        ));

        let at_cooldown_edge = Some(now - Duration::hours(24));
        assert_eq!(
            evaluate_candidate(&learner, at_threshold, at_cooldown_edge, policy, now),
            Eligibility::Skipped(SkipReason::CoolingDown)
        );
        let past_cooldown = Some(now - Duration::hours(24) - Duration::seconds(1));
        assert!(matches!(
            evaluate_candidate(&learner, at_threshold, past_cooldown, policy, now),
            Eligibility::Eligible { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_provider_fails_fast() {
        let store = MemoryStore::new();
        let learner = store.add_learner(Utc::now() - Duration::days(5), Some("a@example.com"));
        store.opt_in(learner, Utc::now());
        let mailer = RecordingMailer::default();

        let summary =
            send_stalled_learner_reminders(&store, &mailer, ReminderPolicy::default(), Utc::now())
                .await;
        assert_eq!(summary.candidates, 0);
        assert_eq!(summary.errors, vec![PROVIDER_NOT_CONFIGURED.to_string()]);
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn test_sent_then_suppressed_within_cooldown() {
        let store = MemoryStore::new();
        let product = store.add_product("CC", "ClaimCenter");
        let intro = store.add_topic(product, 1, "Intro", vec![]);
        let t0 = Utc::now();
        let learner = store.add_learner(t0 - Duration::days(7), Some("stalled@example.com"));
        store.complete(learner, intro, t0 - Duration::hours(50));
        store.opt_in(learner, t0 - Duration::days(7));
        let mailer = RecordingMailer::configured();
        let policy = ReminderPolicy::default();

        let first = send_stalled_learner_reminders(&store, &mailer, policy, t0).await;
        assert_eq!(
            first,
            ReminderSummary {
                candidates: 1,
                attempts: 1,
                triggered: 1,
                skipped: 0,
                errors: vec![],
            }
        );
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].delivered_at, Some(t0));
        assert_eq!(logs[0].notes["status"], "sent");
        assert_eq!(logs[0].notes["provider_id"], "msg-stalled@example.com");

        let second =
            send_stalled_learner_reminders(&store, &mailer, policy, t0 + Duration::hours(1)).await;
        assert_eq!(second.attempts, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(store.logs().len(), 1);

        let third =
            send_stalled_learner_reminders(&store, &mailer, policy, t0 + Duration::hours(25)).await;
        assert_eq!(third.triggered, 1);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_logged_and_retried_next_run() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let learner = store.add_learner(t0 - Duration::days(3), Some("flaky@example.com"));
        store.opt_in(learner, t0 - Duration::days(3));
        let failing = RecordingMailer {
            configured: true,
            failing: vec!["flaky@example.com".to_string()],
            ..Default::default()
        };
        let policy = ReminderPolicy::default();

        let summary = send_stalled_learner_reminders(&store, &failing, policy, t0).await;
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.triggered, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("provider down"));
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].delivered_at, None);
        assert_eq!(logs[0].notes["status"], "error");

        let healthy = RecordingMailer::configured();
        let later = t0 + Duration::minutes(5);
        let retry = send_stalled_learner_reminders(&store, &healthy, policy, later).await;
        assert_eq!(retry.triggered, 1);
        assert_eq!(store.logs().len(), 2);
    }

    #[tokio::test]
    async fn test_only_opted_in_learners_with_profiles_are_candidates() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let old = t0 - Duration::days(4);
        let opted = store.add_learner(old, Some("in@example.com"));
        store.add_learner(old, Some("out@example.com"));
        let fresh = store.add_learner(t0 - Duration::hours(2), Some("fresh@example.com"));
        let no_email = store.add_learner(old, None);
        store.opt_in(opted, old);
        store.opt_in(fresh, old);
        store.opt_in(no_email, old);
        store.opt_in(Uuid::new_v4(), old);
        let mailer = RecordingMailer::configured();

        let summary =
            send_stalled_learner_reminders(&store, &mailer, ReminderPolicy::default(), t0).await;
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(mailer.sent(), vec!["in@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_log_failure_still_counts_as_triggered() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let learner = store.add_learner(t0 - Duration::days(3), Some("a@example.com"));
        store.opt_in(learner, t0);
        store.fail_log_writes(true);
        let mailer = RecordingMailer::configured();

        let summary =
            send_stalled_learner_reminders(&store, &mailer, ReminderPolicy::default(), t0).await;
        assert_eq!(summary.triggered, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Reminder sent but logging failed"));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_sending() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let mailer = RecordingMailer::configured();

        let summary =
            send_stalled_learner_reminders(&store, &mailer, ReminderPolicy::default(), Utc::now())
                .await;
        assert_eq!(summary.attempts, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(mailer.sent().is_empty());
    }
}
