use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// Learning material attached to a topic. Unknown keys are rejected so a
/// malformed ingestion payload fails at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slides_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub learning_objectives: Vec<String>,
}

/// A topic joined with its owning product.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopicRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub position: i32,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub prerequisites: Vec<Uuid>,
    pub content: Json<TopicContent>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated topic ready to be upserted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicUpsert {
    pub id: Uuid,
    pub product_id: Uuid,
    pub position: i32,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub prerequisites: Vec<Uuid>,
    pub content: TopicContent,
    pub published: bool,
}
