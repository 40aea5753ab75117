//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - A project-scoped tracing span via [`run_span`]
//! - Emission functions for key events: phases, shortfalls, loop iterations
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `LogFormat::Json` to [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// Span covering one pipeline run, tagged with the project id.
///
/// Attach it with [`tracing::Instrument`] so it survives across awaits.
pub fn run_span(project_id: &str) -> tracing::Span {
    tracing::info_span!("itemforge.run", project_id = %project_id)
}

/// Emit event: a pipeline phase started.
pub fn emit_phase_started(phase: &str) {
    info!(event = "phase.started", phase = %phase);
}

/// Emit event: a pipeline phase finished with its duration.
pub fn emit_phase_finished(phase: &str, duration_ms: u64) {
    info!(event = "phase.finished", phase = %phase, duration_ms = duration_ms);
}

/// Emit event: an objective ended its attempt budget short of target.
pub fn emit_objective_shortfall(objective: &str, produced: usize, target: usize, attempts: u32) {
    warn!(
        event = "objective.shortfall",
        objective = %objective,
        produced = produced,
        target = target,
        attempts = attempts,
    );
}

/// Emit event: one validation pass finished.
pub fn emit_validation_iteration(iteration: u32, total: usize, invalid: usize) {
    info!(
        event = "validation.iteration",
        iteration = iteration,
        total = total,
        invalid = invalid,
    );
}

/// Emit event: one review pass finished.
pub fn emit_review_iteration(iteration: u32, quality: &str, approval: &str, flagged: usize) {
    info!(
        event = "review.iteration",
        iteration = iteration,
        quality = %quality,
        approval = %approval,
        flagged = flagged,
    );
}

/// Emit event: the pipeline failed fatally (warning level).
pub fn emit_pipeline_failed(phase: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.failed", phase = %phase, error = %error);
}
