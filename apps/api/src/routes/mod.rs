pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::analytics::handlers as analytics;
use crate::progression::handlers as progression;
use crate::reminders::handlers as reminders;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Learner-facing topics
        .route("/api/v1/topics", get(progression::handle_list_topics))
        .route("/api/v1/topics/:id", get(progression::handle_get_topic))
        .route(
            "/api/v1/topics/:id/unlocked",
            get(progression::handle_topic_unlocked),
        )
        .route(
            "/api/v1/topics/:id/start",
            post(progression::handle_start_topic),
        )
        .route(
            "/api/v1/topics/:id/progress",
            post(progression::handle_update_progress),
        )
        .route(
            "/api/v1/products/:code/next-topic",
            get(progression::handle_next_topic),
        )
        // Admin
        .route(
            "/api/v1/admin/topics/import",
            post(progression::handle_import_topics),
        )
        .route(
            "/api/v1/admin/analytics/activation",
            get(analytics::handle_activation_metrics),
        )
        .route(
            "/api/v1/admin/analytics/trend",
            get(analytics::handle_completion_trend),
        )
        .route(
            "/api/v1/admin/analytics/learners",
            get(analytics::handle_learner_activity),
        )
        // Reminders
        .route(
            "/api/v1/reminders/settings",
            put(reminders::handle_update_settings),
        )
        .route("/api/v1/reminders/cron", post(reminders::handle_reminder_cron))
        .with_state(state)
}
