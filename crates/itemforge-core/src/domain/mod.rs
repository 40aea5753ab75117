//! Domain models for itemforge.
//!
//! Canonical definitions for the core entities:
//! - `GenerationProject`: one pipeline run and everything it owns
//! - `LearningObjective`: hierarchical identifier plus description
//! - `Item`: a multiple-choice exam problem
//! - `ValidationOutcome` / `ReviewReport`: per-iteration quality records

pub mod error;
pub mod item;
pub mod objective;
pub mod project;
pub mod quality;

// Re-export main types and errors
pub use error::{PipelineError, Result};
pub use item::{ChoiceKey, Choices, Item};
pub use objective::{compare_objective_numbers, normalize_objective_number, LearningObjective};
pub use project::{ContentAnalysis, GenerationProject, Phase, ProjectStatus};
pub use quality::{
    ApprovalStatus, FixType, QualityLabel, ReviewReport, ValidationBatch, ValidationOutcome,
    ValidationStatus,
};
