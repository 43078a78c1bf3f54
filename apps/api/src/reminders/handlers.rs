use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::reminders::dispatcher::{send_stalled_learner_reminders, ReminderSummary};
use crate::reminders::settings::update_reminder_settings;
use crate::state::AppState;

const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Deserialize)]
pub struct ReminderSettingsRequest {
    pub user_id: Uuid,
    pub opted_in: bool,
}

#[derive(Debug, Serialize)]
pub struct ReminderSettingsResponse {
    pub success: bool,
    pub opted_in: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub success: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<ReminderSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CronResponse {
    fn failed(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                status: status.as_u16(),
                body: None,
                error: Some(error.into()),
            }),
        )
    }
}

/// PUT /api/v1/reminders/settings
pub async fn handle_update_settings(
    State(state): State<AppState>,
    Json(req): Json<ReminderSettingsRequest>,
) -> Result<Json<ReminderSettingsResponse>, AppError> {
    let saved =
        update_reminder_settings(state.store.as_ref(), req.user_id, req.opted_in, Utc::now())
            .await?;
    let message = if saved.opted_in {
        format!(
            "Reminder emails enabled. We will nudge you after {} hours without progress.",
            state.config.reminder_policy.threshold_hours
        )
    } else {
        "Reminder emails disabled. You can re-enable them anytime.".to_string()
    };
    Ok(Json(ReminderSettingsResponse {
        success: true,
        opted_in: saved.opted_in,
        message,
    }))
}

/// POST /api/v1/reminders/cron
/// Called by the external scheduler. Guarded by REMINDER_CRON_SECRET.
pub async fn handle_reminder_cron(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<CronResponse>) {
    let Some(secret) = state.config.reminder_cron_secret.as_deref() else {
        warn!("Reminder cron invoked but REMINDER_CRON_SECRET is not configured");
        return CronResponse::failed(
            StatusCode::INTERNAL_SERVER_ERROR,
            "REMINDER_CRON_SECRET is not configured.",
        );
    };

    if !authorize_cron(&headers, secret) {
        warn!("Reminder cron rejected: bad or missing secret");
        return CronResponse::failed(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    info!("Reminder cron run starting");
    let summary = send_stalled_learner_reminders(
        state.store.as_ref(),
        state.mailer.as_ref(),
        state.config.reminder_policy,
        Utc::now(),
    )
    .await;

    (
        StatusCode::OK,
        Json(CronResponse {
            success: true,
            status: StatusCode::OK.as_u16(),
            body: Some(summary),
            error: None,
        }),
    )
}

/// Accepts the secret from `x-cron-secret` or an `Authorization: Bearer` header.
pub fn authorize_cron(headers: &HeaderMap, secret: &str) -> bool {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
        });

    provided.is_some_and(|token| secrets_match(token.trim(), secret))
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim_start())
}

/// Length-independent comparison so timing does not reveal a matching prefix.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}
