//! Persisted output: the three exam documents and a digest-checked run report.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::assembler::AssembledExam;
use crate::domain::{
    ContentAnalysis, GenerationProject, Item, Phase, ProjectStatus, ReviewReport, ValidationBatch,
};

pub const PROBLEMS_FILE: &str = "exam_problems.txt";
pub const ANSWERS_FILE: &str = "exam_answers.txt";
pub const COMBINED_FILE: &str = "exam_complete.txt";
pub const REPORT_FILE: &str = "run_report.json";
pub const REPORT_DIGEST_FILE: &str = "run_report.digest";

/// Paths written by [`write_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub problems: PathBuf,
    pub answers: PathBuf,
    pub combined: PathBuf,
}

/// Snapshot of a finished (or failed) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub project_id: Uuid,
    pub phase: Phase,
    pub status: ProjectStatus,
    pub error: Option<String>,
    pub analysis: Option<ContentAnalysis>,
    pub items: Vec<Item>,
    pub last_validation: Option<ValidationBatch>,
    pub review_history: Vec<ReviewReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunReport {
    pub fn from_project(project: &GenerationProject) -> Self {
        Self {
            project_id: project.id,
            phase: project.phase,
            status: project.status,
            error: project.error.clone(),
            analysis: project.analysis.clone(),
            items: project.items.clone(),
            last_validation: project.latest_validation().cloned(),
            review_history: project.review_history.clone(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }

    /// The review that gated completion, if any review ran.
    pub fn final_review(&self) -> Option<&ReviewReport> {
        self.review_history.last()
    }
}

/// Write the three exam views into `dir`, creating it if needed.
pub fn write_artifacts(exam: &AssembledExam, dir: &Path) -> Result<ArtifactPaths> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;

    let paths = ArtifactPaths {
        problems: dir.join(PROBLEMS_FILE),
        answers: dir.join(ANSWERS_FILE),
        combined: dir.join(COMBINED_FILE),
    };
    for (path, text) in [
        (&paths.problems, &exam.problems_text),
        (&paths.answers, &exam.answers_text),
        (&paths.combined, &exam.combined_text),
    ] {
        std::fs::write(path, text).with_context(|| format!("write {:?}", path))?;
    }
    Ok(paths)
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `run_report.json` plus its `run_report.digest` sidecar.
pub fn write_run_report(project: &GenerationProject, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;

    let report_path = dir.join(REPORT_FILE);
    let digest_path = dir.join(REPORT_DIGEST_FILE);
    let json = serde_json::to_vec_pretty(&RunReport::from_project(project))
        .context("serialize run report")?;

    std::fs::write(&report_path, &json).with_context(|| format!("write {:?}", report_path))?;
    std::fs::write(&digest_path, content_digest(&json))
        .with_context(|| format!("write {:?}", digest_path))?;

    Ok(report_path)
}

/// Read `run_report.json` from `dir`, verifying it against its digest.
pub fn read_run_report(dir: &Path) -> Result<RunReport> {
    let report_path = dir.join(REPORT_FILE);
    let digest_path = dir.join(REPORT_DIGEST_FILE);

    let json = std::fs::read(&report_path).with_context(|| format!("read {:?}", report_path))?;
    let expected = std::fs::read_to_string(&digest_path)
        .with_context(|| format!("read {:?}", digest_path))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        bail!(
            "run report digest mismatch: expected {}, got {}",
            expected.trim(),
            actual
        );
    }

    serde_json::from_slice(&json).context("parse run report")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = content_digest(b"itemforge");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, content_digest(b"itemforge"));
        assert_ne!(digest, content_digest(b"itemforge "));
    }

    #[test]
    fn test_report_roundtrip_and_tamper_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = GenerationProject::new("source", dir.path(), 2, 3);
        project.mark_complete();

        write_run_report(&project, dir.path()).unwrap();
        let report = read_run_report(dir.path()).unwrap();
        assert_eq!(report.project_id, project.id);
        assert_eq!(report.status, ProjectStatus::Complete);

        std::fs::write(dir.path().join(REPORT_FILE), b"{}").unwrap();
        let err = read_run_report(dir.path()).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }
}
