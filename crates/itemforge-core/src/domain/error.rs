//! Pipeline-level error taxonomy for itemforge.
//!
//! Only the fatal cases surface here. Extraction misses, structural and
//! semantic item defects, and missing objective linkage are all recovered
//! inside their stages and never become a `PipelineError`.

use crate::backend::BackendError;
use crate::extraction::ExtractionError;

/// Fatal pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no learning objectives found in source content")]
    NoObjectives,

    #[error("generation produced no items across {objectives} objective(s)")]
    NoItemsGenerated { objectives: usize },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
