//! Revision supervisor: applies corrective edits between review passes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::domain::{normalize_objective_number, Item, LearningObjective, ReviewReport};
use crate::extraction::extract_collection;
use crate::prompts;
use crate::reviewer::item_number;

/// Item fields a translated recommendation may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    Question,
    Explanation,
    Difficulty,
    Topic,
}

impl FixCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "question" => Some(FixCategory::Question),
            "explanation" => Some(FixCategory::Explanation),
            "difficulty" => Some(FixCategory::Difficulty),
            "topic" => Some(FixCategory::Topic),
            _ => None,
        }
    }

    fn apply(self, item: &mut Item, value: &str) {
        let field = match self {
            FixCategory::Question => &mut item.question,
            FixCategory::Explanation => &mut item.explanation,
            FixCategory::Difficulty => &mut item.difficulty,
            FixCategory::Topic => &mut item.topic,
        };
        *field = value.to_string();
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixInstruction {
    #[serde(alias = "number", alias = "item_number")]
    problem_number: Value,
    #[serde(alias = "field", alias = "type")]
    fix_type: String,
    #[serde(alias = "value")]
    new_value: String,
}

/// What one manager pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub linkage_backfilled: usize,
    pub fixes_applied: usize,
    pub fixes_skipped: usize,
}

impl RevisionSummary {
    pub fn changed_anything(&self) -> bool {
        self.linkage_backfilled > 0 || self.fixes_applied > 0
    }
}

/// Fill in missing objective linkage for the item at `position`.
///
/// Prefers the objective matching the item's own number, then the objective
/// its position falls under. When neither supplies objective text, the
/// item's topic label stands in for it. Returns whether any field changed.
fn backfill_one(
    item: &mut Item,
    position: usize,
    objectives: &[LearningObjective],
    items_per_objective: usize,
) -> bool {
    if item.has_objective_linkage() {
        return false;
    }
    let before = item.clone();

    let own_number = normalize_objective_number(&item.learning_objective_number);
    let by_number = objectives
        .iter()
        .find(|o| !own_number.is_empty() && normalize_objective_number(&o.number) == own_number);
    let by_position = || {
        let idx = (position / items_per_objective.max(1)).min(objectives.len().saturating_sub(1));
        objectives.get(idx)
    };
    if let Some(objective) = by_number.or_else(by_position) {
        item.link_objective(objective);
    }

    if item.learning_objective_text.trim().is_empty() && !item.topic.trim().is_empty() {
        item.learning_objective_text = item.topic.clone();
    }
    *item != before
}

/// Backfill every item lacking linkage, by its position in the set.
pub fn backfill_linkage(
    items: &mut [Item],
    objectives: &[LearningObjective],
    items_per_objective: usize,
) -> usize {
    let mut count = 0;
    for (position, item) in items.iter_mut().enumerate() {
        if backfill_one(item, position, objectives, items_per_objective) {
            count += 1;
        }
    }
    count
}

/// Backfill the items a review flagged, positioned by their item number.
pub fn backfill_flagged(
    items: &mut [Item],
    flagged: &[u32],
    objectives: &[LearningObjective],
    items_per_objective: usize,
) -> usize {
    let mut count = 0;
    for &number in flagged {
        let Some(item) = items.iter_mut().find(|i| i.number == number) else {
            continue;
        };
        let position = number.saturating_sub(1) as usize;
        if backfill_one(item, position, objectives, items_per_objective) {
            count += 1;
        }
    }
    count
}

/// Ask the backend to turn free-text recommendations into per-item edits and
/// apply the usable ones. Returns `(applied, skipped)`.
pub async fn apply_recommendations(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    recommendations: &[String],
    items: &mut [Item],
) -> (usize, usize) {
    if recommendations.is_empty() {
        return (0, 0);
    }

    let prompt = prompts::translate_recommendations(recommendations, items.len());
    let text = match complete_with_retry(backend, retry, &prompt.system, &prompt.user).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "recommendation translation failed");
            return (0, 0);
        }
    };
    let instructions = match extract_collection::<FixInstruction>(&text, "fixes", None) {
        Ok(extracted) => extracted.value,
        Err(e) => {
            warn!(error = %e, "recommendation translation unusable");
            return (0, 0);
        }
    };

    let item_count = items.len();
    let (mut applied, mut skipped) = (0, 0);
    for instruction in instructions {
        let target = item_number(&instruction.problem_number)
            .filter(|n| (1..=item_count).contains(&(*n as usize)))
            .and_then(|n| items.iter_mut().find(|i| i.number == n));
        let category = FixCategory::parse(&instruction.fix_type);
        let value = instruction.new_value.trim();

        match (target, category) {
            (Some(item), Some(category)) if !value.is_empty() => {
                category.apply(item, value);
                applied += 1;
            }
            _ => {
                debug!(
                    problem = ?instruction.problem_number,
                    fix_type = %instruction.fix_type,
                    "skipping unusable fix instruction"
                );
                skipped += 1;
            }
        }
    }
    (applied, skipped)
}

/// Apply everything `report` asks for before the next review pass.
pub async fn revise(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    report: &ReviewReport,
    items: &mut [Item],
    objectives: &[LearningObjective],
    items_per_objective: usize,
) -> RevisionSummary {
    let mut summary = RevisionSummary {
        linkage_backfilled: backfill_linkage(items, objectives, items_per_objective),
        ..RevisionSummary::default()
    };
    summary.linkage_backfilled += backfill_flagged(
        items,
        &report.problems_needing_revision,
        objectives,
        items_per_objective,
    );

    let (applied, skipped) =
        apply_recommendations(backend, retry, &report.recommendations, items).await;
    summary.fixes_applied = applied;
    summary.fixes_skipped = skipped;

    info!(
        iteration = report.iteration,
        backfilled = summary.linkage_backfilled,
        applied,
        skipped,
        "revision pass finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::ScriptedBackend;

    fn objectives() -> Vec<LearningObjective> {
        vec![
            LearningObjective::new("1.1.1.1", "First"),
            LearningObjective::new("1.1.1.2", "Second"),
        ]
    }

    fn bare(number: u32) -> Item {
        Item {
            number,
            question: format!("Q{number}"),
            topic: "Cells".to_string(),
            ..Item::default()
        }
    }

    #[test]
    fn test_backfill_by_position_clamps_to_last_objective() {
        let mut items: Vec<Item> = (1..=5).map(bare).collect();
        let filled = backfill_linkage(&mut items, &objectives(), 2);
        assert_eq!(filled, 5);
        let numbers: Vec<&str> = items
            .iter()
            .map(|i| i.learning_objective_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["1.1.1.1", "1.1.1.1", "1.1.1.2", "1.1.1.2", "1.1.1.2"]);
        assert_eq!(items[2].subtopic_number, "1.1");
    }

    #[test]
    fn test_backfill_prefers_matching_objective_number() {
        let mut item = bare(1);
        item.learning_objective_number = "1.1.1.2".to_string();
        let mut items = vec![item];
        backfill_linkage(&mut items, &objectives(), 2);
        assert_eq!(items[0].learning_objective_text, "Second");
    }

    #[test]
    fn test_backfill_falls_back_to_topic_label() {
        let mut items = vec![bare(1)];
        assert_eq!(backfill_linkage(&mut items, &[], 2), 1);
        assert_eq!(items[0].learning_objective_text, "Cells");
        assert!(!items[0].has_objective_linkage());
    }

    #[test]
    fn test_undescribed_objective_takes_topic_label() {
        let mut item = bare(1);
        item.learning_objective_number = "4.4.4.4".to_string();
        let mut items = vec![item];
        let objectives = vec![LearningObjective::new("4.4.4.4", "")];

        assert_eq!(backfill_linkage(&mut items, &objectives, 1), 1);
        assert_eq!(items[0].learning_objective_text, "Cells");
        assert_eq!(items[0].topic_number, "4");
        assert!(items[0].has_objective_linkage());
    }

    #[test]
    fn test_backfill_that_changes_nothing_is_not_counted() {
        let mut item = bare(1);
        item.topic.clear();
        item.link_objective(&LearningObjective::new("4.4.4.4", ""));
        let mut items = vec![item.clone()];

        let objectives = vec![LearningObjective::new("4.4.4.4", "")];
        assert_eq!(backfill_linkage(&mut items, &objectives, 1), 0);
        assert_eq!(items[0], item);
    }

    #[test]
    fn test_linked_items_are_untouched() {
        let mut item = bare(1);
        item.link_objective(&LearningObjective::new("9.9.9.9", "Other"));
        let mut items = vec![item.clone()];
        assert_eq!(backfill_flagged(&mut items, &[1], &objectives(), 2), 0);
        assert_eq!(items[0], item);
    }

    #[tokio::test]
    async fn test_recommendations_apply_in_range_recognized_fixes() {
        let backend = ScriptedBackend::from_texts([r#"{"fixes": [
            {"problem_number": 2, "fix_type": "explanation", "new_value": "Better."},
            {"problem_number": 9, "fix_type": "explanation", "new_value": "Out of range."},
            {"problem_number": 1, "fix_type": "choices", "new_value": "Unknown field."},
            {"problem_number": "1", "fix_type": "Difficulty", "new_value": "hard"}
        ]}"#]);
        let mut items = vec![bare(1), bare(2)];
        let (applied, skipped) = apply_recommendations(
            &backend,
            &RetryPolicy::immediate(1),
            &["Clarify explanations".to_string()],
            &mut items,
        )
        .await;
        assert_eq!((applied, skipped), (2, 2));
        assert_eq!(items[1].explanation, "Better.");
        assert_eq!(items[0].difficulty, "hard");
    }

    #[tokio::test]
    async fn test_no_recommendations_means_no_call() {
        let backend = ScriptedBackend::default();
        let mut items = vec![bare(1)];
        let outcome = apply_recommendations(&backend, &RetryPolicy::immediate(1), &[], &mut items).await;
        assert_eq!(outcome, (0, 0));
        assert_eq!(backend.call_count(), 0);
    }
}
