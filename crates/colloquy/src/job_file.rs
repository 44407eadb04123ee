//! TOML job files.

use colloquy_core::{Agent, Scenario, Survey};
use colloquy_error::{ColloquyResult, ConfigError};
use colloquy_jobs::JobSpec;
use colloquy_models::{ModelSpec, ScriptedModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A job as written on disk.
///
/// ```toml
/// repetitions = 3
///
/// [[agents]]
/// name = "night-nurse"
/// traits = { age = 41, shift = "night" }
///
/// [[scenarios]]
/// name = "monday"
/// values = { day = "Monday" }
///
/// [[models]]
/// name = "gpt-4o-mini"
/// service = "openai"
///
/// [[survey.questions]]
/// name = "feeling"
/// text = "How do you feel on {{day}}?"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct JobFile {
    /// Default repetition count for this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repetitions: Option<u32>,
    #[serde(default)]
    agents: Vec<Agent>,
    #[serde(default)]
    scenarios: Vec<Scenario>,
    #[serde(default)]
    models: Vec<ModelSpec>,
    survey: Survey,
}

impl JobFile {
    /// Read a job file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> ColloquyResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!(
                "Failed to read job file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a job from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on invalid TOML or a missing survey.
    pub fn from_toml_str(text: &str) -> ColloquyResult<Self> {
        let job: Self = toml::from_str(text)
            .map_err(|e| ConfigError::new(format!("Failed to parse job file: {}", e)))?;
        debug!(
            agents = job.agents.len(),
            scenarios = job.scenarios.len(),
            models = job.models.len(),
            questions = job.survey.len(),
            "Parsed job file"
        );
        Ok(job)
    }

    /// Build model clients and assemble the job.
    ///
    /// # Errors
    ///
    /// Returns an error if a model cannot be built, for example because its
    /// API key is not set.
    pub fn to_job(&self) -> ColloquyResult<JobSpec> {
        let mut job = JobSpec::new(self.survey.clone())
            .with_agents(self.agents.iter().cloned())
            .with_scenarios(self.scenarios.iter().cloned());
        for model in &self.models {
            job = job.with_model(model.build()?);
        }
        Ok(job)
    }

    /// Assemble the job with silent stand-ins for every model.
    ///
    /// Stand-ins keep each model's name and service, so batching decisions
    /// match a live run, but never need credentials.
    pub fn to_offline_job(&self) -> JobSpec {
        let job = JobSpec::new(self.survey.clone())
            .with_agents(self.agents.iter().cloned())
            .with_scenarios(self.scenarios.iter().cloned());
        self.models.iter().fold(job, |job, model| {
            job.with_model(Arc::new(
                ScriptedModel::new(model.name().clone(), model.script().clone())
                    .with_service(model.service().clone()),
            ))
        })
    }
}
