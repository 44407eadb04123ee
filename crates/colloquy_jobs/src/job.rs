//! Job specifications and the base interviews they expand to.

use colloquy_core::{Agent, Scenario, Survey};
use colloquy_error::{ColloquyResult, JobError, JobErrorKind};
use colloquy_interface::LanguageModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of the model that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_getters::Getters)]
pub struct ModelRef {
    name: String,
    service: String,
}

impl ModelRef {
    /// Identity from its parts.
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
        }
    }

    /// Identity of a live model.
    pub fn of(model: &dyn LanguageModel) -> Self {
        Self {
            name: model.model_name().to_string(),
            service: model.inference_service().to_string(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.name)
    }
}

/// Everything a run needs to know about what to ask of whom.
///
/// Base interviews are the cross product agents × scenarios × models, in that
/// nesting order, each asked the whole survey.
#[derive(Clone, Default)]
pub struct JobSpec {
    agents: Vec<Arc<Agent>>,
    scenarios: Vec<Arc<Scenario>>,
    models: Vec<Arc<dyn LanguageModel>>,
    survey: Arc<Survey>,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("agents", &self.agents.len())
            .field("scenarios", &self.scenarios.len())
            .field(
                "models",
                &self
                    .models
                    .iter()
                    .map(|m| ModelRef::of(m.as_ref()).to_string())
                    .collect::<Vec<_>>(),
            )
            .field("questions", &self.survey.len())
            .finish()
    }
}

impl JobSpec {
    /// An empty job asking `survey`.
    pub fn new(survey: Survey) -> Self {
        Self {
            survey: Arc::new(survey),
            ..Self::default()
        }
    }

    /// Add an agent.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(Arc::new(agent));
        self
    }

    /// Add several agents.
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents.into_iter().map(Arc::new));
        self
    }

    /// Add a scenario.
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(Arc::new(scenario));
        self
    }

    /// Add several scenarios.
    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios.into_iter().map(Arc::new));
        self
    }

    /// Add a model.
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Agents in job order.
    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    /// Scenarios in job order.
    pub fn scenarios(&self) -> &[Arc<Scenario>] {
        &self.scenarios
    }

    /// Models in job order.
    pub fn models(&self) -> &[Arc<dyn LanguageModel>] {
        &self.models
    }

    /// The survey asked in every interview.
    pub fn survey(&self) -> &Survey {
        &self.survey
    }

    /// Number of base interviews.
    ///
    /// An empty scenario list counts as a single empty scenario.
    pub fn base_interview_count(&self) -> usize {
        self.agents.len() * self.scenarios.len().max(1) * self.models.len()
    }

    /// Check the job can run.
    ///
    /// # Errors
    ///
    /// Returns `EmptyJob` if there are no agents, models or questions.
    pub fn validate(&self) -> ColloquyResult<()> {
        if self.agents.is_empty() {
            return Err(JobError::new(JobErrorKind::EmptyJob("agents".into())).into());
        }
        if self.models.is_empty() {
            return Err(JobError::new(JobErrorKind::EmptyJob("models".into())).into());
        }
        if self.survey.is_empty() {
            return Err(JobError::new(JobErrorKind::EmptyJob("questions".into())).into());
        }
        Ok(())
    }

    /// Base interview at `base_index`, or `None` past the end.
    pub fn interview(&self, base_index: usize) -> Option<Interview> {
        if base_index >= self.base_interview_count() {
            return None;
        }
        let per_agent = self.scenarios.len().max(1) * self.models.len();
        let agent = &self.agents[base_index / per_agent];
        let scenario = if self.scenarios.is_empty() {
            Arc::new(Scenario::default())
        } else {
            Arc::clone(&self.scenarios[(base_index / self.models.len()) % self.scenarios.len()])
        };
        let model = &self.models[base_index % self.models.len()];

        Some(Interview {
            agent: Arc::clone(agent),
            scenario,
            model: Arc::clone(model),
            survey: Arc::clone(&self.survey),
            base_index,
        })
    }

    /// All base interviews in job order.
    pub fn interviews(&self) -> impl Iterator<Item = Interview> + '_ {
        (0..self.base_interview_count()).filter_map(|i| self.interview(i))
    }
}

/// One agent answering the survey under one scenario on one model.
///
/// Cloning shares every component.
#[derive(Clone)]
pub struct Interview {
    agent: Arc<Agent>,
    scenario: Arc<Scenario>,
    model: Arc<dyn LanguageModel>,
    survey: Arc<Survey>,
    base_index: usize,
}

impl fmt::Debug for Interview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interview")
            .field("agent", &self.agent.name())
            .field("scenario", &self.scenario.name())
            .field("model", &ModelRef::of(self.model.as_ref()))
            .field("base_index", &self.base_index)
            .finish()
    }
}

impl Interview {
    /// The answering agent.
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// The scenario filling question placeholders.
    pub fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    /// The model asked.
    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// The survey asked.
    pub fn survey(&self) -> &Arc<Survey> {
        &self.survey
    }

    /// Position among the job's base interviews.
    pub fn base_index(&self) -> usize {
        self.base_index
    }

    /// Identity of the model.
    pub fn model_ref(&self) -> ModelRef {
        ModelRef::of(self.model.as_ref())
    }
}
