//! Content analyst: one backend call that classifies the source and lists its
//! learning objectives.
//!
//! The literal objective scan runs first and is passed to the backend as a
//! hint. Whenever the backend's own list comes back empty (or the call or its
//! parse fails outright) the literal scan is used instead.

use tracing::{info, warn};

use crate::backend::{complete_with_retry, GenerativeBackend, RetryPolicy};
use crate::domain::{ContentAnalysis, LearningObjective, PipelineError, Result};
use crate::extraction::extract_record;
use crate::objectives::extract_objectives;
use crate::prompts;

/// Analyse `source` and return topics, difficulty bands and objectives.
///
/// Fails only with [`PipelineError::NoObjectives`], when neither the backend
/// nor the literal scan yields a single objective.
pub async fn analyze_content(
    backend: &dyn GenerativeBackend,
    retry: &RetryPolicy,
    source: &str,
) -> Result<ContentAnalysis> {
    let scanned = extract_objectives(source);
    info!(scanned = scanned.len(), "literal objective scan finished");

    let prompt = prompts::analysis(source, &scanned);
    let mut analysis = match complete_with_retry(backend, retry, &prompt.system, &prompt.user).await
    {
        Ok(text) => match extract_record::<ContentAnalysis>(&text) {
            Ok(extracted) => extracted.value,
            Err(e) => {
                warn!(error = %e, "content analysis reply unusable, using literal scan only");
                ContentAnalysis::default()
            }
        },
        Err(e) => {
            warn!(error = %e, "content analysis call failed, using literal scan only");
            ContentAnalysis::default()
        }
    };

    analysis.learning_objectives = clean_objectives(analysis.learning_objectives);
    if analysis.learning_objectives.is_empty() {
        if !scanned.is_empty() {
            info!(count = scanned.len(), "backend listed no objectives, falling back to literal scan");
        }
        analysis.learning_objectives = scanned;
    }

    if analysis.learning_objectives.is_empty() {
        return Err(PipelineError::NoObjectives);
    }
    Ok(analysis)
}

/// Drop objectives without a number and duplicate numbers, keeping order.
fn clean_objectives(objectives: Vec<LearningObjective>) -> Vec<LearningObjective> {
    let mut seen = std::collections::HashSet::new();
    objectives
        .into_iter()
        .map(|mut o| {
            o.number = o.number.trim().trim_end_matches('.').to_string();
            o.description = o.description.trim().to_string();
            o
        })
        .filter(|o| !o.number.is_empty() && seen.insert(o.number.clone()))
        .collect()
}
