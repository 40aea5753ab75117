//! Per-item validation: a local structural check, then a semantic check in
//! which the backend solves the item independently.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::domain::{
    ChoiceKey, FixType, Item, ValidationBatch, ValidationOutcome, ValidationStatus,
};
use crate::extraction::extract_record;
use crate::prompts;

/// Issue note attached when the semantic check could not be completed.
pub const UNVERIFIED_NOTE: &str = "semantic check unavailable; item left unverified";

/// Reply shape of the semantic check.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SemanticVerdict {
    #[serde(alias = "answer", alias = "correct_answer")]
    selected_answer: String,
    #[serde(alias = "ambiguous")]
    is_ambiguous: bool,
    explanation_accurate: Option<bool>,
    issues: Vec<String>,
}

/// Everything mechanically wrong with `item`. Empty means structurally sound.
pub fn structural_issues(item: &Item) -> Vec<String> {
    let mut issues = Vec::new();
    if item.question.trim().is_empty() {
        issues.push("question text is empty".to_string());
    }
    for key in item.choices.empty_keys() {
        issues.push(format!("choice {key} is empty"));
    }
    match item.correct_key() {
        None if item.correct_answer.trim().is_empty() => {
            issues.push("correct answer is missing".to_string());
        }
        None => issues.push(format!(
            "correct answer {:?} is not one of A-D",
            item.correct_answer
        )),
        Some(key) if item.choices.get(key).trim().is_empty() => {
            issues.push(format!("correct answer {key} points at an empty choice"));
        }
        Some(_) => {}
    }
    issues
}

/// Validate one item.
///
/// Structurally broken items are marked [`FixType::Structural`] without a
/// backend call. A failed or unreadable semantic check leaves the item valid
/// with an issue note; only an actual disagreement or ambiguity fails it.
pub async fn validate_item(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    item: &Item,
) -> ValidationOutcome {
    let issues = structural_issues(item);
    if !issues.is_empty() {
        debug!(item = item.number, ?issues, "structural check failed");
        return ValidationOutcome::structural(item.number, issues);
    }

    let prompt = prompts::semantic_check(item);
    let verdict = match complete_with_retry(backend, retry, &prompt.system, &prompt.user).await {
        Ok(text) => extract_record::<SemanticVerdict>(&text).map(|e| e.value).ok(),
        Err(e) => {
            warn!(item = item.number, error = %e, "semantic check call failed");
            None
        }
    };

    let Some(verdict) = verdict else {
        let mut outcome = ValidationOutcome::valid(item.number);
        outcome.issues.push(UNVERIFIED_NOTE.to_string());
        return outcome;
    };

    judge(item, verdict)
}

fn judge(item: &Item, verdict: SemanticVerdict) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::valid(item.number);
    outcome.issues = verdict.issues;
    outcome.is_ambiguous = verdict.is_ambiguous;

    match ChoiceKey::parse(&verdict.selected_answer) {
        Some(selected) => {
            outcome.selected_answer = Some(selected.to_string());
            outcome.answer_matches = Some(selected) == item.correct_key();
            if !outcome.answer_matches {
                outcome.issues.push(format!(
                    "independent solve chose {selected}, item says {}",
                    item.correct_answer.trim()
                ));
            }
        }
        None => outcome.issues.push(UNVERIFIED_NOTE.to_string()),
    }

    if verdict.explanation_accurate == Some(false) {
        outcome.issues.push("explanation may be inaccurate".to_string());
    }
    if outcome.is_ambiguous {
        outcome
            .issues
            .push("more than one choice is defensible".to_string());
    }

    if !outcome.answer_matches || outcome.is_ambiguous {
        outcome.status = ValidationStatus::Invalid;
        outcome.fix_type = Some(FixType::Semantic);
    }
    outcome
}

/// Validate every item in order.
pub async fn validate_items(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    items: &[Item],
    iteration: u32,
) -> ValidationBatch {
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        outcomes.push(validate_item(backend, retry, item).await);
    }

    ValidationBatch {
        iteration,
        outcomes,
        validated_at: chrono::Utc::now(),
    }
}
