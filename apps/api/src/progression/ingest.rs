//! Bulk topic ingestion.
//!
//! Every violation in a batch is collected and reported together; the batch is
//! written only when none are found. Validation runs in two passes: the shape
//! of each descriptor first, then references against the persisted catalog
//! (products, prerequisite ids, cycles) merged with the incoming batch.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::topic::{ProductRow, TopicContent, TopicUpsert};
use crate::store::{ProgressStore, TopicEdges};

/// One descriptor of an ingestion payload. Every field is optional at the
/// serde level so a missing field becomes a reported violation rather than a
/// rejected request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestionTopic {
    pub id: Option<String>,
    pub product_code: Option<String>,
    pub position: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub prerequisites: Option<Vec<String>>,
    pub content: Option<TopicContent>,
    pub published: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpsertResult {
    pub success: bool,
    pub count: u64,
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn label(topic: &IngestionTopic, id: Uuid) -> String {
    trimmed(topic.title.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

fn normalize_strings(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

fn sanitize_content(content: Option<&TopicContent>) -> TopicContent {
    let Some(content) = content else {
        return TopicContent::default();
    };
    let keep = |v: &Option<String>| trimmed(v.as_deref()).map(str::to_string);
    TopicContent {
        video_url: keep(&content.video_url),
        slides_url: keep(&content.slides_url),
        notes: keep(&content.notes),
        learning_objectives: normalize_strings(&content.learning_objectives),
    }
}

/// Assigns ids and checks each descriptor on its own plus per-product
/// position uniqueness. Returns the assigned ids in batch order.
pub fn check_batch_shape(topics: &[IngestionTopic]) -> Result<Vec<Uuid>, Vec<String>> {
    if topics.is_empty() {
        return Err(vec!["No topics provided for ingestion.".to_string()]);
    }

    let mut errors = Vec::new();
    let mut ids = Vec::with_capacity(topics.len());
    let mut positions: HashMap<&str, HashSet<i32>> = HashMap::new();
    let mut seen_ids = HashSet::new();

    for topic in topics {
        let id = match trimmed(topic.id.as_deref()) {
            None => Uuid::new_v4(),
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => {
                    if !seen_ids.insert(id) {
                        errors.push(format!("Duplicate topic id {id} in batch."));
                    }
                    id
                }
                Err(_) => {
                    errors.push(format!("Topic id \"{raw}\" is not a valid UUID."));
                    Uuid::new_v4()
                }
            },
        };
        ids.push(id);
        let name = label(topic, id);

        let product_code = trimmed(topic.product_code.as_deref());
        if product_code.is_none() {
            errors.push(format!("Topic \"{name}\" is missing product_code."));
        }

        if trimmed(topic.title.as_deref()).is_none() {
            match topic.position {
                Some(p) => errors.push(format!("Topic with position {p} is missing a title.")),
                None => errors.push("Topic without position is missing a title.".to_string()),
            }
        }

        if topic.duration_minutes.is_some_and(|d| d < 0) {
            errors.push(format!("Topic \"{name}\" has a negative duration_minutes."));
        }

        if let Some(content) = &topic.content {
            let urls = [
                ("video_url", &content.video_url),
                ("slides_url", &content.slides_url),
            ];
            for (field, value) in urls {
                if let Some(url) = trimmed(value.as_deref()) {
                    if !is_http_url(url) {
                        errors.push(format!("Topic \"{name}\" has a non-http {field}: {url}."));
                    }
                }
            }
        }

        let Some(position) = topic.position else {
            errors.push(format!("Topic \"{name}\" has an invalid position."));
            continue;
        };

        let key = product_code.unwrap_or("unknown");
        if !positions.entry(key).or_default().insert(position) {
            errors.push(format!(
                "Duplicate position {position} detected for product {key}."
            ));
        }
    }

    if errors.is_empty() {
        Ok(ids)
    } else {
        Err(errors)
    }
}

/// Resolves product codes and prerequisite references against the catalog
/// and rejects prerequisite cycles in the merged graph.
pub fn resolve_batch(
    topics: &[IngestionTopic],
    ids: &[Uuid],
    products: &[ProductRow],
    existing: &[TopicEdges],
) -> Result<Vec<TopicUpsert>, Vec<String>> {
    let mut errors = Vec::new();
    let product_ids: HashMap<&str, Uuid> =
        products.iter().map(|p| (p.code.as_str(), p.id)).collect();
    let known: HashSet<Uuid> = existing
        .iter()
        .map(|t| t.id)
        .chain(ids.iter().copied())
        .collect();

    let mut upserts = Vec::with_capacity(topics.len());
    for (topic, &id) in topics.iter().zip(ids) {
        let name = label(topic, id);
        let code = trimmed(topic.product_code.as_deref()).unwrap_or_default();
        let product_id = product_ids.get(code).copied();
        if product_id.is_none() {
            errors.push(format!("Unknown product_code \"{code}\" for topic \"{name}\"."));
        }

        let mut prerequisites = Vec::new();
        let mut missing = Vec::new();
        for raw in normalize_strings(topic.prerequisites.as_deref().unwrap_or_default()) {
            match Uuid::parse_str(&raw) {
                Ok(prereq) if prereq == id => {
                    errors.push(format!("Topic \"{name}\" lists itself as a prerequisite."));
                }
                Ok(prereq) if known.contains(&prereq) => {
                    if !prerequisites.contains(&prereq) {
                        prerequisites.push(prereq);
                    }
                }
                _ => missing.push(raw),
            }
        }
        if !missing.is_empty() {
            errors.push(format!(
                "Topic \"{name}\" references missing prerequisites: {}.",
                missing.join(", ")
            ));
        }

        upserts.push(TopicUpsert {
            id,
            product_id: product_id.unwrap_or_default(),
            position: topic.position.unwrap_or_default(),
            title: trimmed(topic.title.as_deref()).unwrap_or_default().to_string(),
            description: trimmed(topic.description.as_deref()).map(str::to_string),
            duration_minutes: topic.duration_minutes.unwrap_or(0),
            prerequisites,
            content: sanitize_content(topic.content.as_ref()),
            published: topic.published.unwrap_or(true),
        });
    }

    let names: HashMap<Uuid, String> = topics
        .iter()
        .zip(ids)
        .map(|(topic, &id)| (id, label(topic, id)))
        .collect();
    for cycle in find_cycles(existing, &upserts) {
        let path: Vec<String> = cycle
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect();
        errors.push(format!("Prerequisite cycle detected: {}.", path.join(" -> ")));
    }

    if errors.is_empty() {
        Ok(upserts)
    } else {
        Err(errors)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Cycles in persisted ∪ batch edges that pass through at least one batch topic.
/// Each cycle is returned as a closed path (first id repeated at the end).
fn find_cycles(existing: &[TopicEdges], batch: &[TopicUpsert]) -> Vec<Vec<Uuid>> {
    let mut graph: HashMap<Uuid, Vec<Uuid>> = existing
        .iter()
        .map(|t| (t.id, t.prerequisites.clone()))
        .collect();
    for topic in batch {
        graph.insert(topic.id, topic.prerequisites.clone());
    }

    let batch_ids: HashSet<Uuid> = batch.iter().map(|t| t.id).collect();
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    let mut cycles = Vec::new();

    for topic in batch {
        visit(topic.id, &graph, &mut marks, &mut path, &mut cycles);
    }

    cycles.retain(|cycle| cycle.iter().any(|id| batch_ids.contains(id)));
    cycles
}

fn visit(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    marks: &mut HashMap<Uuid, Mark>,
    path: &mut Vec<Uuid>,
    cycles: &mut Vec<Vec<Uuid>>,
) {
    match marks.get(&node) {
        Some(Mark::Done) => return,
        Some(Mark::Visiting) => {
            if let Some(start) = path.iter().position(|n| *n == node) {
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                cycles.push(cycle);
            }
            return;
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    path.push(node);
    for next in graph.get(&node).into_iter().flatten() {
        if *next != node && graph.contains_key(next) {
            visit(*next, graph, marks, path, cycles);
        }
    }
    path.pop();
    marks.insert(node, Mark::Done);
}

/// Validates and writes a batch. Any violation rejects the whole batch.
pub async fn bulk_upsert_topics(
    store: &dyn ProgressStore,
    topics: &[IngestionTopic],
    now: DateTime<Utc>,
) -> Result<BulkUpsertResult, AppError> {
    let ids = check_batch_shape(topics).map_err(reject)?;

    let products = store.list_products().await?;
    let existing = store.topic_graph().await?;
    let upserts = resolve_batch(topics, &ids, &products, &existing).map_err(reject)?;

    let count = store.upsert_topics(&upserts, now).await?;
    info!("Ingested {count} topics");
    Ok(BulkUpsertResult {
        success: true,
        count,
    })
}

fn reject(errors: Vec<String>) -> AppError {
    warn!("Topic ingestion rejected with {} errors", errors.len());
    AppError::Rejected(errors)
}
