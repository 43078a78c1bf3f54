use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::reminder::ReminderSettingRow;
use crate::store::ProgressStore;

/// Opting in stamps `last_opt_in_at`; opting out keeps the previous stamp
/// (or `now` for a learner with no prior row).
pub fn next_setting(
    existing: Option<&ReminderSettingRow>,
    user_id: Uuid,
    opted_in: bool,
    now: DateTime<Utc>,
) -> ReminderSettingRow {
    let last_opt_in_at = if opted_in {
        Some(now)
    } else {
        existing.and_then(|s| s.last_opt_in_at).or(Some(now))
    };

    ReminderSettingRow {
        user_id,
        opted_in,
        last_opt_in_at,
        updated_at: now,
    }
}

pub async fn update_reminder_settings(
    store: &dyn ProgressStore,
    user_id: Uuid,
    opted_in: bool,
    now: DateTime<Utc>,
) -> Result<ReminderSettingRow, AppError> {
    let existing = store.reminder_setting(user_id).await?;
    let setting = next_setting(existing.as_ref(), user_id, opted_in, now);
    let saved = store.upsert_reminder_setting(&setting).await?;
    info!("Reminder preference for {user_id} set to opted_in={opted_in}");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn test_opt_in_stamps_now() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let setting = next_setting(None, user, true, now);
        assert!(setting.opted_in);
        assert_eq!(setting.last_opt_in_at, Some(now));
    }

    #[test]
    fn test_opt_out_keeps_previous_stamp() {
        let earlier = Utc::now() - Duration::days(3);
        let now = Utc::now();
        let user = Uuid::new_v4();
        let existing = next_setting(None, user, true, earlier);

        let setting = next_setting(Some(&existing), user, false, now);
        assert!(!setting.opted_in);
        assert_eq!(setting.last_opt_in_at, Some(earlier));
        assert_eq!(setting.updated_at, now);
    }

    #[tokio::test]
    async fn test_update_persists_and_filters_opted_in() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        update_reminder_settings(&store, user, true, now).await.unwrap();
        assert_eq!(store.opted_in_settings().await.unwrap().len(), 1);

        let saved = update_reminder_settings(&store, user, false, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(saved.last_opt_in_at, Some(now));
        assert!(store.opted_in_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let err = update_reminder_settings(&store, Uuid::new_v4(), true, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
