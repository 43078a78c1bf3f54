use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::completion::CompletionRow;
use crate::progression::assembler::{get_topic, list_topics, next_topic, TopicView};
use crate::progression::ingest::{bulk_upsert_topics, BulkUpsertResult, IngestionTopic};
use crate::progression::resolver::is_unlocked;
use crate::progression::tracker::{mark_started, update_progress, validate_progress};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct OptionalUserQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct TopicListQuery {
    pub product: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub topic_id: Uuid,
    pub unlocked: bool,
}

#[derive(Debug, Serialize)]
pub struct NextTopicResponse {
    pub topic: Option<TopicView>,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub topic_id: Uuid,
    pub created: bool,
}

#[derive(Deserialize)]
pub struct ProgressRequest {
    pub user_id: Uuid,
    pub completion_percentage: i32,
    #[serde(default)]
    pub time_spent_seconds: i64,
    pub video_progress_seconds: Option<i32>,
}

/// GET /api/v1/topics
pub async fn handle_list_topics(
    State(state): State<AppState>,
    Query(params): Query<TopicListQuery>,
) -> Result<Json<Vec<TopicView>>, AppError> {
    let product = params
        .product
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let views = list_topics(state.store.as_ref(), product, params.user_id).await?;
    Ok(Json(views))
}

/// GET /api/v1/topics/:id
pub async fn handle_get_topic(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OptionalUserQuery>,
) -> Result<Json<TopicView>, AppError> {
    let view = get_topic(state.store.as_ref(), id, params.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Topic {id} not found")))?;
    Ok(Json(view))
}

/// GET /api/v1/topics/:id/unlocked
pub async fn handle_topic_unlocked(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Json<UnlockResponse> {
    let unlocked = is_unlocked(state.store.as_ref(), params.user_id, id).await;
    Json(UnlockResponse {
        topic_id: id,
        unlocked,
    })
}

/// GET /api/v1/products/:code/next-topic
pub async fn handle_next_topic(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<NextTopicResponse>, AppError> {
    let topic = next_topic(state.store.as_ref(), &code, params.user_id).await?;
    Ok(Json(NextTopicResponse { topic }))
}

/// POST /api/v1/topics/:id/start
pub async fn handle_start_topic(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    ensure_open(&state, req.user_id, id).await?;
    let created = mark_started(state.store.as_ref(), req.user_id, id, Utc::now()).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(StartResponse { topic_id: id, created })))
}

/// POST /api/v1/topics/:id/progress
pub async fn handle_update_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<CompletionRow>, AppError> {
    let update = validate_progress(
        req.completion_percentage,
        req.time_spent_seconds,
        req.video_progress_seconds,
    )?;
    ensure_open(&state, req.user_id, id).await?;
    let row = update_progress(state.store.as_ref(), req.user_id, id, update, Utc::now()).await?;
    Ok(Json(row))
}

/// POST /api/v1/admin/topics/import
pub async fn handle_import_topics(
    State(state): State<AppState>,
    Json(topics): Json<Vec<IngestionTopic>>,
) -> Result<Json<BulkUpsertResult>, AppError> {
    let result = bulk_upsert_topics(state.store.as_ref(), &topics, Utc::now()).await?;
    Ok(Json(result))
}

/// Unknown or unpublished topics are 404; locked ones are 403.
async fn ensure_open(state: &AppState, user_id: Uuid, topic_id: Uuid) -> Result<(), AppError> {
    if state.store.published_topic(topic_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Topic {topic_id} not found")));
    }
    if !is_unlocked(state.store.as_ref(), user_id, topic_id).await {
        return Err(AppError::Forbidden(format!(
            "Topic {topic_id} is locked until its prerequisites are completed"
        )));
    }
    Ok(())
}
