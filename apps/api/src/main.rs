mod analytics;
mod config;
mod db;
mod errors;
mod models;
mod progression;
mod reminders;
mod routes;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::reminders::email::{ReminderMailer, ResendMailer};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgProgressStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Academy API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let store = Arc::new(PgProgressStore::new(db));

    // Reminder email provider. Missing credentials are reported per dispatch run.
    let mailer = ResendMailer::new(
        config.resend_api_key.clone(),
        config.reminder_email_from.clone(),
    );
    if !mailer.is_configured() {
        warn!("RESEND_API_KEY or REMINDER_EMAIL_FROM not set; reminder runs will fail fast");
    }
    if config.reminder_cron_secret.is_none() {
        warn!("REMINDER_CRON_SECRET not set; the reminder cron endpoint is disabled");
    }
    info!(
        "Reminder policy: threshold {}h, cooldown {}h",
        config.reminder_policy.threshold_hours, config.reminder_policy.cooldown_hours
    );

    // Build app state
    let state = AppState {
        store,
        mailer: Arc::new(mailer),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
