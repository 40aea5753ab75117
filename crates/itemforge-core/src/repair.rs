//! Repair routing for items that failed validation.
//!
//! Structural failures go to the fixer, which patches choices, key and
//! explanation in place. Semantic failures are regenerated from scratch for
//! the same objective. Either way the item keeps its number and its objective
//! linkage, and an unusable repair leaves the original untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::domain::{Choices, ContentAnalysis, FixType, Item, LearningObjective, ValidationBatch};
use crate::extraction::extract_record;
use crate::fanout::{request_items, GenerationContext};
use crate::prompts;
use crate::validator::structural_issues;

/// Reply shape of the fixer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixReply {
    choices: Choices,
    #[serde(alias = "answer")]
    correct_answer: String,
    explanation: String,
}

/// Counts from one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub fixed: usize,
    pub regenerated: usize,
    /// Item numbers whose repair produced nothing usable.
    pub unrepaired: Vec<u32>,
}

/// Ask the fixer to complete a structurally broken item.
///
/// Returns the patched item only if the patch is structurally sound.
pub async fn fix_structural(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    analysis: &ContentAnalysis,
    item: &Item,
) -> Option<Item> {
    let prompt = prompts::fix(item, analysis);
    let text = match complete_with_retry(backend, retry, &prompt.system, &prompt.user).await {
        Ok(text) => text,
        Err(e) => {
            warn!(item = item.number, error = %e, "fixer call failed");
            return None;
        }
    };
    let reply = extract_record::<FixReply>(&text).ok()?.value;

    let mut patched = item.clone();
    patched.choices = reply.choices;
    patched.correct_answer = reply.correct_answer.trim().to_string();
    patched.canonicalize_answer();
    if !reply.explanation.trim().is_empty() {
        patched.explanation = reply.explanation;
    }

    let remaining = structural_issues(&patched);
    if remaining.is_empty() {
        Some(patched)
    } else {
        debug!(item = item.number, ?remaining, "fixer output still broken");
        None
    }
}

/// Regenerate a semantically flawed item for the same objective.
pub async fn regenerate(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    ctx: &GenerationContext,
    item: &Item,
) -> Option<Item> {
    let objective = LearningObjective::new(
        item.learning_objective_number.clone(),
        item.learning_objective_text.clone(),
    );
    let candidates = match request_items(backend, retry, ctx, &objective, 1).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(item = item.number, error = %e, "regeneration failed");
            return None;
        }
    };
    let fresh = candidates
        .into_iter()
        .find(|c| structural_issues(c).is_empty())?;
    Some(inherit_identity(fresh, item))
}

/// Carry number, objective linkage and topic label over from `original`.
fn inherit_identity(mut fresh: Item, original: &Item) -> Item {
    fresh.canonicalize_answer();
    fresh.number = original.number;
    fresh.learning_objective_number = original.learning_objective_number.clone();
    fresh.learning_objective_text = original.learning_objective_text.clone();
    fresh.topic_number = original.topic_number.clone();
    fresh.subtopic_number = original.subtopic_number.clone();
    if !original.topic.trim().is_empty() {
        fresh.topic = original.topic.clone();
    }
    if fresh.difficulty.trim().is_empty() {
        fresh.difficulty = original.difficulty.clone();
    }
    fresh
}

/// Repair every invalid item named in `batch`, in place and in order.
pub async fn repair_items(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    ctx: &GenerationContext,
    items: &mut [Item],
    batch: &ValidationBatch,
) -> RepairSummary {
    let mut summary = RepairSummary::default();

    for outcome in batch.invalid() {
        let Some(idx) = items.iter().position(|i| i.number == outcome.item_number) else {
            continue;
        };
        let fix_type = outcome.fix_type.unwrap_or(FixType::Semantic);
        let repaired = match fix_type {
            FixType::Structural => fix_structural(backend, retry, &ctx.analysis, &items[idx]).await,
            FixType::Semantic => regenerate(backend, retry, ctx, &items[idx]).await,
        };
        match repaired {
            Some(item) => {
                items[idx] = item;
                match fix_type {
                    FixType::Structural => summary.fixed += 1,
                    FixType::Semantic => summary.regenerated += 1,
                }
            }
            None => summary.unrepaired.push(outcome.item_number),
        }
    }

    info!(
        fixed = summary.fixed,
        regenerated = summary.regenerated,
        unrepaired = summary.unrepaired.len(),
        "repair pass finished"
    );
    summary
}
