//! Objective-partitioned generation fan-out.
//!
//! One task per learning objective. Each task owns its accumulator and keeps
//! asking for the remaining count until it reaches the target or spends its
//! attempt budget. Partial batches (salvaged from truncated replies) are
//! merged, never discarded. A failing task yields an empty batch and never
//! cancels its siblings. The fan-in concatenates batches in objective order.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::config::PipelineConfig;
use crate::domain::{ContentAnalysis, Item, LearningObjective, PipelineError, Result};
use crate::extraction::{extract_collection, ITEM_SALVAGE};
use crate::obs::emit_objective_shortfall;
use crate::prompts;

/// Read-only context shared by every generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub analysis: ContentAnalysis,
    pub source: String,
}

/// Budgets for the fan-out.
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    pub items_per_objective: usize,
    pub max_attempts: u32,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl From<&PipelineConfig> for FanOutConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            items_per_objective: config.items_per_objective,
            max_attempts: config.generation_attempts,
            max_concurrent: config.max_concurrent_objectives,
            retry: config.retry.clone(),
        }
    }
}

/// What one objective task produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveBatch {
    pub objective: LearningObjective,
    pub items: Vec<Item>,
    pub attempts: u32,
    /// Last error seen by the task, if any attempt failed.
    pub last_error: Option<String>,
}

impl ObjectiveBatch {
    pub fn shortfall(&self, target: usize) -> usize {
        target.saturating_sub(self.items.len())
    }
}

/// Combined fan-in result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutReport {
    /// All items, numbered 1..=n in objective order.
    pub items: Vec<Item>,
    pub batches: Vec<ObjectiveBatch>,
}

impl FanOutReport {
    pub fn total_shortfall(&self, target: usize) -> usize {
        self.batches.iter().map(|b| b.shortfall(target)).sum()
    }
}

/// Ask the backend for `count` items tagged to `objective`.
///
/// Returns whatever extraction recovered, which may be fewer than `count`.
pub async fn request_items(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    ctx: &GenerationContext,
    objective: &LearningObjective,
    count: usize,
) -> std::result::Result<Vec<Item>, String> {
    let prompt = prompts::generation(&ctx.analysis, objective, count, &ctx.source);
    let text = complete_with_retry(backend, retry, &prompt.system, &prompt.user)
        .await
        .map_err(|e| e.to_string())?;
    let extracted =
        extract_collection::<Item>(&text, "problems", Some(ITEM_SALVAGE)).map_err(|e| e.to_string())?;
    if extracted.is_partial() {
        debug!(
            objective = %objective.number,
            recovered = extracted.value.len(),
            requested = count,
            "salvaged partial batch"
        );
    }
    Ok(extracted.value)
}

/// Merge `incoming` into `acc`, skipping questions already accumulated.
///
/// Items without question text are dropped; nothing downstream can repair them.
/// Answer keys are stored in canonical form.
pub fn merge_batch(acc: &mut Vec<Item>, seen: &mut HashSet<String>, incoming: Vec<Item>) -> usize {
    let before = acc.len();
    for mut item in incoming {
        item.canonicalize_answer();
        let fingerprint = item.question_fingerprint();
        if fingerprint.is_empty() || !seen.insert(fingerprint) {
            continue;
        }
        acc.push(item);
    }
    acc.len() - before
}

/// Run the attempt loop for one objective.
#[instrument(skip_all, fields(objective = %objective.number))]
pub async fn generate_for_objective(
    backend: &dyn GenerativeBackend,
    ctx: &GenerationContext,
    objective: &LearningObjective,
    config: &FanOutConfig,
) -> ObjectiveBatch {
    let target = config.items_per_objective;
    let mut acc: Vec<Item> = Vec::with_capacity(target);
    let mut seen = HashSet::new();
    let mut attempts = 0;
    let mut last_error = None;

    while attempts < config.max_attempts && acc.len() < target {
        attempts += 1;
        let remaining = target - acc.len();
        match request_items(backend, &config.retry, ctx, objective, remaining).await {
            Ok(items) => {
                let added = merge_batch(&mut acc, &mut seen, items);
                debug!(attempt = attempts, added, total = acc.len(), target, "generation attempt merged");
            }
            Err(e) => {
                warn!(attempt = attempts, error = %e, "generation attempt failed");
                last_error = Some(e);
            }
        }
    }

    acc.truncate(target);
    if acc.len() < target {
        emit_objective_shortfall(&objective.number, acc.len(), target, attempts);
    }

    let fallback_topic = ctx.analysis.topics.first().cloned().unwrap_or_default();
    for item in &mut acc {
        item.link_objective(objective);
        if item.topic.trim().is_empty() {
            item.topic = fallback_topic.clone();
        }
    }

    ObjectiveBatch {
        objective: objective.clone(),
        items: acc,
        attempts,
        last_error,
    }
}

/// Generate items for every objective concurrently and fan the results in.
///
/// Fails with [`PipelineError::NoItemsGenerated`] only when the combined set
/// is empty.
#[instrument(skip_all, fields(objectives = objectives.len()))]
pub async fn fan_out(
    backend: Arc<dyn GenerativeBackend>,
    ctx: Arc<GenerationContext>,
    objectives: &[LearningObjective],
    config: &FanOutConfig,
) -> Result<FanOutReport> {
    let sem = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    let handles: Vec<_> = objectives
        .iter()
        .cloned()
        .map(|objective| {
            let backend = Arc::clone(&backend);
            let ctx = Arc::clone(&ctx);
            let config = config.clone();
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                generate_for_objective(backend.as_ref(), &ctx, &objective, &config).await
            })
        })
        .collect();

    let joined = join_all(handles).await;

    let mut batches = Vec::with_capacity(objectives.len());
    for (objective, outcome) in objectives.iter().zip(joined) {
        match outcome {
            Ok(batch) => batches.push(batch),
            Err(e) => {
                warn!(objective = %objective.number, error = %e, "objective task aborted");
                batches.push(ObjectiveBatch {
                    objective: objective.clone(),
                    items: Vec::new(),
                    attempts: 0,
                    last_error: Some(e.to_string()),
                });
            }
        }
    }

    let mut items: Vec<Item> = batches.iter().flat_map(|b| b.items.iter().cloned()).collect();
    if items.is_empty() {
        return Err(PipelineError::NoItemsGenerated {
            objectives: objectives.len(),
        });
    }
    for (idx, item) in items.iter_mut().enumerate() {
        item.number = idx as u32 + 1;
    }

    Ok(FanOutReport { items, batches })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(question: &str) -> Item {
        Item {
            question: question.to_string(),
            ..Item::default()
        }
    }

    #[test]
    fn test_merge_skips_repeats_and_blank_questions() {
        let mut acc = vec![item("What is a process?")];
        let mut seen: HashSet<String> = acc.iter().map(Item::question_fingerprint).collect();
        let added = merge_batch(
            &mut acc,
            &mut seen,
            vec![item("what is a  process?"), item(""), item("What is a thread?")],
        );
        assert_eq!(added, 1);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc[1].question, "What is a thread?");
    }

    #[test]
    fn test_shortfall() {
        let batch = ObjectiveBatch {
            objective: LearningObjective::new("1.1.1.1", "x"),
            items: vec![item("a")],
            attempts: 5,
            last_error: None,
        };
        assert_eq!(batch.shortfall(3), 2);
        assert_eq!(batch.shortfall(1), 0);
    }
}
