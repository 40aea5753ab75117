//! itemforge core library
//!
//! Turns unstructured source material into a validated bank of
//! multiple-choice exam items grouped by learning objective, driving a
//! generative text backend through analysis, concurrent generation,
//! validation with repair, and review with revision.

pub mod analyst;
pub mod artifacts;
pub mod assembler;
pub mod backend;
pub mod config;
pub mod domain;
pub mod extraction;
pub mod fanout;
pub mod manager;
pub mod obs;
pub mod objectives;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod repair;
pub mod reviewer;
pub mod telemetry;
pub mod validator;

pub use domain::{
    ApprovalStatus, ChoiceKey, Choices, ContentAnalysis, FixType, GenerationProject, Item,
    LearningObjective, Phase, PipelineError, ProjectStatus, QualityLabel, Result, ReviewReport,
    ValidationBatch, ValidationOutcome, ValidationStatus,
};

pub use analyst::analyze_content;
pub use artifacts::{read_run_report, write_artifacts, write_run_report, ArtifactPaths, RunReport};
pub use assembler::{assemble, AssembledExam};
pub use backend::http::{HttpBackend, HttpBackendConfig};
pub use backend::{
    complete_with_retry, BackendError, BackendResult, GenerativeBackend, RetryPolicy,
};
pub use config::PipelineConfig;
pub use extraction::{extract_collection, extract_record, ExtractionError, ExtractionMethod};
pub use fanout::{fan_out, FanOutReport, GenerationContext, ObjectiveBatch};
pub use objectives::extract_objectives;
pub use pipeline::ExamPipeline;
pub use progress::{ChannelProgress, NoopProgress, ProgressSink, ProgressUpdate, TracingProgress};
pub use telemetry::{init_tracing, LogFormat};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
