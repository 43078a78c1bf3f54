//! Prerequisite resolver.
//!
//! A topic is unlocked for a learner iff every direct prerequisite has a
//! completion row with `completed_at` set, or the learner already completed
//! the topic itself. Anything the resolver cannot evaluate counts as locked.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::models::completion::CompletionRow;
use crate::store::ProgressStore;

/// Completions for one learner, keyed by topic id.
pub type CompletionLookup<'a> = HashMap<Uuid, &'a CompletionRow>;

pub fn completion_lookup(completions: &[CompletionRow]) -> CompletionLookup<'_> {
    completions.iter().map(|c| (c.topic_id, c)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub prerequisites_met: bool,
    pub is_locked: bool,
}

impl Gate {
    /// Used when there is no learner or their completions could not be read.
    pub const CLOSED: Gate = Gate {
        prerequisites_met: false,
        is_locked: true,
    };
}

pub fn prerequisites_met(prerequisites: &[Uuid], lookup: &CompletionLookup<'_>) -> bool {
    prerequisites
        .iter()
        .all(|id| lookup.get(id).is_some_and(|c| c.is_completed()))
}

pub fn evaluate_gate(
    topic_id: Uuid,
    prerequisites: &[Uuid],
    lookup: &CompletionLookup<'_>,
) -> Gate {
    let met = prerequisites_met(prerequisites, lookup);
    let already_completed = lookup.get(&topic_id).is_some_and(|c| c.is_completed());
    Gate {
        prerequisites_met: met,
        is_locked: !met && !already_completed,
    }
}

/// Fail-closed unlock check for a single published topic.
pub async fn is_unlocked(store: &dyn ProgressStore, user_id: Uuid, topic_id: Uuid) -> bool {
    let topic = match store.published_topic(topic_id).await {
        Ok(Some(topic)) => topic,
        Ok(None) => return false,
        Err(e) => {
            warn!("Unlock check for topic {topic_id} could not load topic: {e}");
            return false;
        }
    };

    let completions = match store.user_completions(user_id).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Unlock check for user {user_id} could not load completions: {e}");
            return false;
        }
    };

    let lookup = completion_lookup(&completions);
    !evaluate_gate(topic.id, &topic.prerequisites, &lookup).is_locked
}
