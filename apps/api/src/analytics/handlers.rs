use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::analytics::activation::{activation_metrics, ActivationMetrics};
use crate::analytics::learners::{learner_activity_report, LearnerActivityReport};
use crate::analytics::trend::{
    completion_trend, CompletionTrendPoint, DEFAULT_TREND_DAYS, MAX_TREND_DAYS,
};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

/// GET /api/v1/admin/analytics/activation
/// Fails soft: a store outage renders as zeroed metrics, never a 500.
pub async fn handle_activation_metrics(State(state): State<AppState>) -> Json<ActivationMetrics> {
    let threshold = state.config.reminder_policy.threshold_hours;
    Json(activation_metrics(state.store.as_ref(), threshold, Utc::now()).await)
}

/// GET /api/v1/admin/analytics/trend
pub async fn handle_completion_trend(
    State(state): State<AppState>,
    Query(params): Query<TrendQuery>,
) -> Result<Json<Vec<CompletionTrendPoint>>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(0..=MAX_TREND_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 0 and {MAX_TREND_DAYS}, got {days}"
        )));
    }
    Ok(Json(completion_trend(state.store.as_ref(), days, Utc::now()).await))
}

/// GET /api/v1/admin/analytics/learners
pub async fn handle_learner_activity(
    State(state): State<AppState>,
) -> Result<Json<LearnerActivityReport>, AppError> {
    let report = learner_activity_report(state.store.as_ref(), Utc::now()).await?;
    Ok(Json(report))
}
