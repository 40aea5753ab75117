//! End-to-end orchestration of one generation run.
//!
//! Phases run in order: content analysis, item generation, validation with
//! repair, final review with revisions, then assembly. Every loop is bounded
//! by the run's budgets. Only the fatal cases (no objectives, no items,
//! invalid budgets) end the run in the error state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, Instrument};

use crate::analyst::analyze_content;
use crate::assembler::{assemble, AssembledExam};
use crate::backend::GenerativeBackend;
use crate::config::PipelineConfig;
use crate::domain::{GenerationProject, Phase, PipelineError, Result};
use crate::fanout::{fan_out, FanOutConfig, GenerationContext};
use crate::manager;
use crate::obs::{
    emit_phase_finished, emit_phase_started, emit_pipeline_failed, emit_review_iteration,
    emit_validation_iteration, run_span,
};
use crate::progress::{NoopProgress, ProgressSink, ProgressUpdate};
use crate::repair::repair_items;
use crate::reviewer::review_items;
use crate::validator::validate_items;

/// Drives a [`GenerationProject`] from raw source to an assembled exam.
pub struct ExamPipeline {
    backend: Arc<dyn GenerativeBackend>,
    config: PipelineConfig,
    progress: Arc<dyn ProgressSink>,
}

impl ExamPipeline {
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: PipelineConfig) -> Self {
        Self {
            backend,
            config,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every phase against `project`.
    ///
    /// The item target and validation budget come from the project; the other
    /// budgets come from the pipeline config. On a fatal error the project is
    /// marked `error` with the message before the error is returned.
    pub async fn run(&self, project: &mut GenerationProject) -> Result<AssembledExam> {
        let span = run_span(&project.id.to_string());
        async {
            match self.run_phases(project).await {
                Ok(exam) => Ok(exam),
                Err(e) => {
                    emit_pipeline_failed(&project.phase.to_string(), &e);
                    project.mark_error(e.to_string());
                    self.report(project.phase, 100, format!("failed: {e}"));
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_phases(&self, project: &mut GenerationProject) -> Result<AssembledExam> {
        if project.is_terminal() {
            return Err(PipelineError::Config(format!(
                "project {} has already finished",
                project.id
            )));
        }
        if project.items_per_objective == 0 || project.validation_iterations == 0 {
            return Err(PipelineError::Config(
                "items_per_objective and validation_iterations must be greater than 0".to_string(),
            ));
        }
        self.config.validate()?;

        self.analyse(project).await?;
        self.generate(project).await?;
        self.validate(project).await;
        self.review(project).await;

        let started = self.begin(project, Phase::Complete);
        let exam = assemble(&project.items);
        project.items = exam.items.clone();
        project.mark_complete();
        emit_phase_finished(&Phase::Complete.to_string(), elapsed_ms(started));
        self.report(
            Phase::Complete,
            100,
            format!("assembled {} items in {} sections", exam.items.len(), exam.sections),
        );
        Ok(exam)
    }

    async fn analyse(&self, project: &mut GenerationProject) -> Result<()> {
        let started = self.begin(project, Phase::ContentAnalysis);
        self.report(Phase::ContentAnalysis, 5, "analysing source content");

        let analysis =
            analyze_content(self.backend.as_ref(), &self.config.retry, &project.source_text).await?;
        let count = analysis.learning_objectives.len();
        project.analysis = Some(analysis);

        emit_phase_finished(&Phase::ContentAnalysis.to_string(), elapsed_ms(started));
        self.report(
            Phase::ContentAnalysis,
            15,
            format!("found {count} learning objectives"),
        );
        Ok(())
    }

    async fn generate(&self, project: &mut GenerationProject) -> Result<()> {
        let started = self.begin(project, Phase::ItemGeneration);
        let objectives = project.objectives().to_vec();
        let target = project.items_per_objective;
        self.report(
            Phase::ItemGeneration,
            20,
            format!("generating {target} items for each of {} objectives", objectives.len()),
        );

        let ctx = Arc::new(GenerationContext {
            analysis: project.analysis.clone().unwrap_or_default(),
            source: project.source_text.clone(),
        });
        let config = FanOutConfig {
            items_per_objective: target,
            ..FanOutConfig::from(&self.config)
        };
        let report = fan_out(Arc::clone(&self.backend), ctx, &objectives, &config).await?;
        let shortfall = report.total_shortfall(target);
        project.items = report.items;

        emit_phase_finished(&Phase::ItemGeneration.to_string(), elapsed_ms(started));
        self.report(
            Phase::ItemGeneration,
            40,
            format!("generated {} items ({shortfall} short of target)", project.items.len()),
        );
        Ok(())
    }

    /// Validate, repairing between passes. Repair never runs after the last
    /// pass, so the final batch in history reflects the items as they stand.
    async fn validate(&self, project: &mut GenerationProject) {
        let started = self.begin(project, Phase::Validation);
        let budget = project.validation_iterations;
        let ctx = GenerationContext {
            analysis: project.analysis.clone().unwrap_or_default(),
            source: project.source_text.clone(),
        };

        for iteration in 1..=budget {
            let batch = validate_items(
                self.backend.as_ref(),
                &self.config.retry,
                &project.items,
                iteration,
            )
            .await;
            let invalid = batch.invalid_count();
            emit_validation_iteration(iteration, batch.outcomes.len(), invalid);
            self.report(
                Phase::Validation,
                progress_between(40, 70, iteration, budget),
                format!("validation pass {iteration}: {invalid} invalid"),
            );

            if invalid > 0 && iteration < budget {
                repair_items(
                    self.backend.as_ref(),
                    &self.config.retry,
                    &ctx,
                    &mut project.items,
                    &batch,
                )
                .await;
            }
            project.validation_history.push(batch);

            if invalid == 0 {
                break;
            }
        }

        if let Some(batch) = project.latest_validation() {
            if batch.invalid_count() > 0 {
                info!(
                    remaining = batch.invalid_count(),
                    "validation budget spent with invalid items remaining"
                );
            }
        }
        emit_phase_finished(&Phase::Validation.to_string(), elapsed_ms(started));
    }

    /// Review, revising between passes, until the quality bar is met or the
    /// budget is spent. The last report stands either way.
    async fn review(&self, project: &mut GenerationProject) {
        let started = self.begin(project, Phase::FinalReview);
        let budget = self.config.review_iterations;
        let objectives = project.objectives().to_vec();

        for iteration in 1..=budget {
            let report = review_items(
                self.backend.as_ref(),
                &self.config.retry,
                &project.items,
                project.latest_validation(),
                iteration,
            )
            .await;
            emit_review_iteration(
                iteration,
                report.overall_quality.as_str(),
                report.approval_status.as_str(),
                report.problems_needing_revision.len(),
            );
            self.report(
                Phase::FinalReview,
                progress_between(70, 95, iteration, budget),
                format!(
                    "review pass {iteration}: {} / {}",
                    report.overall_quality, report.approval_status
                ),
            );

            let done = report.meets_quality_bar();
            if !done && iteration < budget {
                let summary = manager::revise(
                    self.backend.as_ref(),
                    &self.config.retry,
                    &report,
                    &mut project.items,
                    &objectives,
                    project.items_per_objective,
                )
                .await;
                if !summary.changed_anything() {
                    debug!(iteration, "revision pass changed nothing");
                }
            }
            project.review_history.push(report);

            if done {
                break;
            }
        }
        emit_phase_finished(&Phase::FinalReview.to_string(), elapsed_ms(started));
    }

    fn begin(&self, project: &mut GenerationProject, phase: Phase) -> Instant {
        project.enter_phase(phase);
        emit_phase_started(&phase.to_string());
        Instant::now()
    }

    fn report(&self, phase: Phase, percent: u8, message: impl Into<String>) {
        if let Err(e) = self
            .progress
            .report(&ProgressUpdate::new(phase, percent, message))
        {
            debug!(error = %e, "progress sink rejected update");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Percent for step `step` of `total`, spread over `from..=to`.
fn progress_between(from: u8, to: u8, step: u32, total: u32) -> u8 {
    let span = u32::from(to.saturating_sub(from));
    let step = step.min(total.max(1));
    from + (span * step / total.max(1)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FnBackend, ScriptedBackend};
    use crate::backend::RetryPolicy;
    use crate::domain::ProjectStatus;
    use crate::progress::ChannelProgress;

    #[test]
    fn test_progress_between() {
        assert_eq!(progress_between(40, 70, 1, 3), 50);
        assert_eq!(progress_between(40, 70, 3, 3), 70);
        assert_eq!(progress_between(40, 70, 9, 3), 70);
    }

    #[tokio::test]
    async fn test_no_objectives_marks_project_error() {
        let backend: Arc<dyn GenerativeBackend> =
            Arc::new(ScriptedBackend::from_texts([r#"{"topics": []}"#]));
        let (sink, mut rx) = ChannelProgress::new();
        let pipeline = ExamPipeline::new(backend, PipelineConfig::default())
            .with_progress(Arc::new(sink));
        let mut project = GenerationProject::new("plain prose only", "out", 2, 2);

        let err = pipeline.run(&mut project).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoObjectives));
        assert_eq!(project.status, ProjectStatus::Error);
        assert_eq!(project.phase, Phase::ContentAnalysis);
        assert!(project.error.as_deref().unwrap_or_default().contains("objectives"));

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        assert!(last.unwrap().message.starts_with("failed"));
    }

    #[tokio::test]
    async fn test_zero_budget_is_rejected() {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(ScriptedBackend::default());
        let pipeline = ExamPipeline::new(backend, PipelineConfig::default());
        let mut project = GenerationProject::new("1.1.1.1 x", "out", 0, 2);
        let err = pipeline.run(&mut project).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_closed_progress_receiver_does_not_stop_the_run() {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(FnBackend::new(|system: &str, _user: &str| {
            let reply = if system.contains("item writer") {
                r#"{"problems": [{"question": "Which is first?",
                    "choices": {"A": "a", "B": "b", "C": "c", "D": "d"},
                    "correct_answer": "A", "topic": "Order"}]}"#
            } else if system.contains("strict exam reviewer") {
                r#"{"selected_answer": "A", "is_ambiguous": false}"#
            } else {
                r#"{"overall_quality": "excellent", "approval_status": "approved"}"#
            };
            Ok(reply.to_string())
        }));
        let (sink, rx) = ChannelProgress::new();
        drop(rx);
        let config = PipelineConfig {
            items_per_objective: 1,
            retry: RetryPolicy::immediate(1),
            ..PipelineConfig::default()
        };
        let pipeline = ExamPipeline::new(backend, config).with_progress(Arc::new(sink));
        let mut project = GenerationProject::new("1.1.1.1 Put things in order\n", "out", 1, 1);

        let exam = pipeline.run(&mut project).await.unwrap();
        assert_eq!(project.status, ProjectStatus::Complete);
        assert_eq!(exam.items.len(), 1);
    }
}
