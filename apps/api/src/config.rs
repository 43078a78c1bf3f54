use anyhow::{Context, Result};

pub const DEFAULT_REMINDER_THRESHOLD_HOURS: i64 = 48;
pub const DEFAULT_REMINDER_MIN_HOURS: i64 = 24;
/// Ten years. Larger values would overflow date arithmetic in the dispatcher.
pub const MAX_REMINDER_HOURS: i64 = 24 * 365 * 10;

/// Staleness threshold and cooldown shared by the activation dashboard and
/// the reminder dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub threshold_hours: i64,
    pub cooldown_hours: i64,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            threshold_hours: DEFAULT_REMINDER_THRESHOLD_HOURS,
            cooldown_hours: DEFAULT_REMINDER_MIN_HOURS,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub reminder_policy: ReminderPolicy,
    /// Email provider credentials. Missing values are reported by every
    /// dispatch run rather than at startup.
    pub resend_api_key: Option<String>,
    pub reminder_email_from: Option<String>,
    pub reminder_cron_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            reminder_policy: ReminderPolicy {
                threshold_hours: hours_env(
                    "REMINDER_THRESHOLD_HOURS",
                    DEFAULT_REMINDER_THRESHOLD_HOURS,
                )?,
                cooldown_hours: hours_env("REMINDER_MIN_HOURS", DEFAULT_REMINDER_MIN_HOURS)?,
            },
            resend_api_key: optional_env("RESEND_API_KEY"),
            reminder_email_from: optional_env("REMINDER_EMAIL_FROM"),
            reminder_cron_secret: optional_env("REMINDER_CRON_SECRET"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn hours_env(key: &str, default: i64) -> Result<i64> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => parse_hours(key, &raw),
    }
}

fn parse_hours(key: &str, raw: &str) -> Result<i64> {
    let hours = raw
        .parse::<i64>()
        .with_context(|| format!("{key} must be a whole number of hours, got '{raw}'"))?;
    anyhow::ensure!(hours >= 0, "{key} cannot be negative, got {hours}");
    anyhow::ensure!(
        hours <= MAX_REMINDER_HOURS,
        "{key} cannot exceed {MAX_REMINDER_HOURS} hours, got {hours}"
    );
    Ok(hours)
}
