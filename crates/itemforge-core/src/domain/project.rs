//! `GenerationProject`: one end-to-end run of the item-bank pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::Item;
use super::objective::LearningObjective;
use super::quality::{ReviewReport, ValidationBatch};

/// Pipeline phase. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ContentAnalysis,
    ItemGeneration,
    Validation,
    FinalReview,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::ContentAnalysis => "content_analysis",
            Phase::ItemGeneration => "item_generation",
            Phase::Validation => "validation",
            Phase::FinalReview => "final_review",
            Phase::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    InProgress,
    Complete,
    Error,
}

/// Output of the content-analysis phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentAnalysis {
    pub summary: String,
    pub topics: Vec<String>,
    #[serde(alias = "difficulty_bands", alias = "difficulty_distribution")]
    pub difficulty_levels: Vec<String>,
    #[serde(alias = "objectives")]
    pub learning_objectives: Vec<LearningObjective>,
}

/// One generation run.
///
/// Exclusively owns its item set and its validation/review history. Each
/// pipeline stage mutates it only while holding control of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProject {
    pub id: Uuid,
    #[serde(skip_serializing, default)]
    pub source_text: String,
    pub output_dir: PathBuf,
    pub items_per_objective: usize,
    pub validation_iterations: u32,
    pub phase: Phase,
    pub status: ProjectStatus,
    pub analysis: Option<ContentAnalysis>,
    pub items: Vec<Item>,
    pub validation_history: Vec<ValidationBatch>,
    pub review_history: Vec<ReviewReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationProject {
    pub fn new(
        source_text: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        items_per_objective: usize,
        validation_iterations: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_text: source_text.into(),
            output_dir: output_dir.into(),
            items_per_objective,
            validation_iterations,
            phase: Phase::ContentAnalysis,
            status: ProjectStatus::InProgress,
            analysis: None,
            items: Vec::new(),
            validation_history: Vec::new(),
            review_history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Objectives found during analysis, empty before analysis has run.
    pub fn objectives(&self) -> &[LearningObjective] {
        self.analysis
            .as_ref()
            .map(|a| a.learning_objectives.as_slice())
            .unwrap_or(&[])
    }

    pub fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.touch();
    }

    pub fn mark_complete(&mut self) {
        self.phase = Phase::Complete;
        self.status = ProjectStatus::Complete;
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ProjectStatus::Error;
        self.error = Some(message.into());
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ProjectStatus::Complete | ProjectStatus::Error)
    }

    pub fn latest_validation(&self) -> Option<&ValidationBatch> {
        self.validation_history.last()
    }

    pub fn latest_review(&self) -> Option<&ReviewReport> {
        self.review_history.last()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
