use std::sync::Arc;

use crate::config::Config;
use crate::reminders::email::ReminderMailer;
use crate::store::ProgressStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres in production, `MemoryStore` in tests.
    pub store: Arc<dyn ProgressStore>,
    /// Outbound reminder email. Default: ResendMailer.
    pub mailer: Arc<dyn ReminderMailer>,
    pub config: Config,
}

#[cfg(test)]
impl AppState {
    pub fn for_tests(
        store: Arc<dyn ProgressStore>,
        mailer: Arc<dyn ReminderMailer>,
        cron_secret: Option<&str>,
    ) -> Self {
        use crate::config::ReminderPolicy;

        Self {
            store,
            mailer,
            config: Config {
                database_url: "postgres://localhost/academy_test".to_string(),
                port: 0,
                rust_log: "debug".to_string(),
                reminder_policy: ReminderPolicy::default(),
                resend_api_key: None,
                reminder_email_from: None,
                reminder_cron_secret: cron_secret.map(str::to_string),
            },
        }
    }
}
