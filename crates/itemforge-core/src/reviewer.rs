//! Aggregate review of the whole item set.
//!
//! The verdict labels come from the backend. Objective linkage is checked
//! locally, and any missing linkage caps approval at needs-revision no matter
//! what the backend said.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::domain::{ApprovalStatus, Item, QualityLabel, ReviewReport, ValidationBatch};
use crate::extraction::extract_record;
use crate::prompts;

/// Issue recorded when the backend verdict could not be obtained.
pub const REVIEW_UNAVAILABLE: &str = "review unavailable; verdict unknown";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReviewReply {
    #[serde(alias = "quality")]
    overall_quality: String,
    #[serde(alias = "approval")]
    approval_status: String,
    issues: Vec<String>,
    #[serde(alias = "problems_to_revise")]
    problems_needing_revision: Vec<Value>,
    recommendations: Vec<String>,
}

/// Item numbers lacking objective number or text.
pub fn missing_linkage(items: &[Item]) -> Vec<u32> {
    items
        .iter()
        .filter(|i| !i.has_objective_linkage())
        .map(|i| i.number)
        .collect()
}

/// Produce the review report for iteration `iteration`.
pub async fn review_items(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    items: &[Item],
    latest: Option<&ValidationBatch>,
    iteration: u32,
) -> ReviewReport {
    let prompt = prompts::review(items, latest);
    let reply = match complete_with_retry(backend, retry, &prompt.system, &prompt.user).await {
        Ok(text) => match extract_record::<ReviewReply>(&text) {
            Ok(extracted) => Some(extracted.value),
            Err(e) => {
                warn!(iteration, error = %e, "review reply unusable");
                None
            }
        },
        Err(e) => {
            warn!(iteration, error = %e, "review call failed");
            None
        }
    };

    let mut report = match reply {
        Some(reply) => ReviewReport {
            iteration,
            overall_quality: QualityLabel::parse(&reply.overall_quality),
            approval_status: ApprovalStatus::parse(&reply.approval_status),
            issues: reply.issues,
            problems_needing_revision: reply
                .problems_needing_revision
                .iter()
                .filter_map(item_number)
                .collect(),
            recommendations: reply.recommendations,
            missing_objective_linkage: Vec::new(),
        },
        None => ReviewReport {
            iteration,
            overall_quality: QualityLabel::Unknown,
            approval_status: ApprovalStatus::Unknown,
            issues: vec![REVIEW_UNAVAILABLE.to_string()],
            problems_needing_revision: Vec::new(),
            recommendations: Vec::new(),
            missing_objective_linkage: Vec::new(),
        },
    };

    if let Some(batch) = latest {
        let invalid = batch.invalid_numbers();
        if !invalid.is_empty() {
            report.issues.push(format!(
                "{} problem(s) still failed validation after repair: {invalid:?}",
                invalid.len()
            ));
            for number in invalid {
                if !report.problems_needing_revision.contains(&number) {
                    report.problems_needing_revision.push(number);
                }
            }
        }
    }

    let missing = missing_linkage(items);
    if !missing.is_empty() {
        report.issues.push(format!(
            "{} problem(s) lack learning objective linkage: {missing:?}",
            missing.len()
        ));
        report.approval_status = report.approval_status.at_most_needs_revision();
        report.missing_objective_linkage = missing;
    }

    report
}

/// Item number from a JSON number or a string like `"3"` or `"Problem 3"`.
pub(crate) fn item_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok(),
        _ => None,
    }
}
