//! Validation outcomes and review reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-item validation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

/// How an invalid item gets repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    /// Mechanically broken (empty choice, bad key). Routed to the fixer.
    Structural,
    /// Judged wrong or ambiguous by the backend. Routed to regeneration.
    Semantic,
}

/// Validation result for one item in one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub item_number: u32,
    /// The backend's own re-derivation of the correct key, when it was asked.
    pub selected_answer: Option<String>,
    pub answer_matches: bool,
    pub is_ambiguous: bool,
    pub issues: Vec<String>,
    pub status: ValidationStatus,
    pub fix_type: Option<FixType>,
}

impl ValidationOutcome {
    pub fn valid(item_number: u32) -> Self {
        Self {
            item_number,
            selected_answer: None,
            answer_matches: true,
            is_ambiguous: false,
            issues: Vec::new(),
            status: ValidationStatus::Valid,
            fix_type: None,
        }
    }

    pub fn structural(item_number: u32, issues: Vec<String>) -> Self {
        Self {
            item_number,
            selected_answer: None,
            answer_matches: false,
            is_ambiguous: false,
            issues,
            status: ValidationStatus::Invalid,
            fix_type: Some(FixType::Structural),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// All outcomes from one validation iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationBatch {
    /// 1-based iteration index.
    pub iteration: u32,
    /// Outcomes in item order.
    pub outcomes: Vec<ValidationOutcome>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationBatch {
    pub fn invalid(&self) -> impl Iterator<Item = &ValidationOutcome> {
        self.outcomes.iter().filter(|o| !o.is_valid())
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid().count()
    }

    pub fn invalid_numbers(&self) -> Vec<u32> {
        self.invalid().map(|o| o.item_number).collect()
    }
}

/// Aggregate quality label produced by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    #[serde(other)]
    Unknown,
}

impl QualityLabel {
    pub fn parse(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "excellent" => Self::Excellent,
            "good" => Self::Good,
            "fair" | "acceptable" => Self::Fair,
            "poor" => Self::Poor,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval verdict produced by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Rejected,
    NeedsRevision,
    Approved,
    #[serde(other)]
    Unknown,
}

impl ApprovalStatus {
    pub fn parse(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "approved" => Self::Approved,
            "needs_revision" | "needs_revisions" | "revision_needed" => Self::NeedsRevision,
            "rejected" => Self::Rejected,
            _ => Self::Unknown,
        }
    }

    /// Cap the status at `NeedsRevision`. Lower verdicts pass through.
    pub fn at_most_needs_revision(self) -> Self {
        match self {
            Self::Approved | Self::Unknown => Self::NeedsRevision,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::NeedsRevision => "needs_revision",
            Self::Approved => "approved",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Aggregate verdict over the whole item set for one review iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub iteration: u32,
    pub overall_quality: QualityLabel,
    pub approval_status: ApprovalStatus,
    pub issues: Vec<String>,
    pub problems_needing_revision: Vec<u32>,
    pub recommendations: Vec<String>,
    /// Items lacking objective number or text, found by the local check.
    pub missing_objective_linkage: Vec<u32>,
}

impl ReviewReport {
    /// The completion gate: excellent quality and approved.
    pub fn meets_quality_bar(&self) -> bool {
        self.overall_quality == QualityLabel::Excellent
            && self.approval_status == ApprovalStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing_is_lenient() {
        assert_eq!(QualityLabel::parse("Excellent"), QualityLabel::Excellent);
        assert_eq!(QualityLabel::parse("mediocre"), QualityLabel::Unknown);
        assert_eq!(
            ApprovalStatus::parse("Needs Revision"),
            ApprovalStatus::NeedsRevision
        );
        assert_eq!(
            ApprovalStatus::parse("needs-revision"),
            ApprovalStatus::NeedsRevision
        );
        assert_eq!(ApprovalStatus::parse("APPROVED"), ApprovalStatus::Approved);
    }

    #[test]
    fn test_at_most_needs_revision() {
        assert_eq!(
            ApprovalStatus::Approved.at_most_needs_revision(),
            ApprovalStatus::NeedsRevision
        );
        assert_eq!(
            ApprovalStatus::Rejected.at_most_needs_revision(),
            ApprovalStatus::Rejected
        );
    }

    #[test]
    fn test_quality_bar_requires_both_labels() {
        let mut report = ReviewReport {
            iteration: 1,
            overall_quality: QualityLabel::Excellent,
            approval_status: ApprovalStatus::NeedsRevision,
            issues: vec![],
            problems_needing_revision: vec![],
            recommendations: vec![],
            missing_objective_linkage: vec![],
        };
        assert!(!report.meets_quality_bar());
        report.approval_status = ApprovalStatus::Approved;
        assert!(report.meets_quality_bar());
        report.overall_quality = QualityLabel::Good;
        assert!(!report.meets_quality_bar());
    }

    #[test]
    fn test_batch_counts_invalid() {
        let batch = ValidationBatch {
            iteration: 1,
            outcomes: vec![
                ValidationOutcome::valid(1),
                ValidationOutcome::structural(2, vec!["choice C is empty".to_string()]),
            ],
            validated_at: Utc::now(),
        };
        assert_eq!(batch.invalid_count(), 1);
        assert_eq!(batch.invalid_numbers(), vec![2]);
    }
}
