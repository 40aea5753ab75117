//! Pipeline configuration.
//!
//! Every loop in the pipeline has a hard numeric ceiling and they all live
//! here. Values load from TOML; missing keys take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::RetryPolicy;
use crate::domain::{PipelineError, Result};

/// Budgets and targets for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Items to generate for each learning objective.
    pub items_per_objective: usize,
    /// Generation attempts per objective before accepting a shortfall.
    pub generation_attempts: u32,
    /// Validation passes (with repair between passes).
    pub validation_iterations: u32,
    /// Review passes (with manager revisions between passes).
    pub review_iterations: u32,
    /// Objective tasks allowed in flight at once.
    pub max_concurrent_objectives: usize,
    /// Retry policy applied to every backend call.
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            items_per_objective: 5,
            generation_attempts: 5,
            validation_iterations: 3,
            review_iterations: 3,
            max_concurrent_objectives: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject budgets that would make a loop run zero times.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.items_per_objective == 0, "items_per_objective"),
            (self.generation_attempts == 0, "generation_attempts"),
            (self.validation_iterations == 0, "validation_iterations"),
            (self.review_iterations == 0, "review_iterations"),
            (self.max_concurrent_objectives == 0, "max_concurrent_objectives"),
            (self.retry.max_attempts == 0, "retry.max_attempts"),
        ];
        for (bad, field) in checks {
            if bad {
                return Err(PipelineError::Config(format!("{field} must be greater than 0")));
            }
        }
        Ok(())
    }
}
