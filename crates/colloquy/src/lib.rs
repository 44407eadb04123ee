//! Colloquy - batch LLM interviews
//!
//! Colloquy asks a survey of many simulated respondents across scenarios and
//! models, possibly many times each, and collects the answers in a
//! deterministic order while respecting provider rate limits, retrying
//! transient failures and supporting cooperative cancellation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use colloquy::{Agent, ColloquyConfig, JobRunner, JobSpec, Question, ScriptedModel, Survey};
//! use std::sync::Arc;
//!
//! # async fn example() -> colloquy::ColloquyResult<()> {
//! let survey = Survey::new(vec![Question::free_text("feeling", "How do you feel today?")]);
//! let job = JobSpec::new(survey)
//!     .with_agent(Agent::new("nurse"))
//!     .with_model(Arc::new(ScriptedModel::new("echo", vec!["Tired".into()])));
//!
//! let results = JobRunner::new(ColloquyConfig::load()?).run(&job, 10).await?;
//! assert_eq!(results.len(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `colloquy_error` - Error types
//! - `colloquy_core` - Agents, scenarios, surveys, requests, cache keys
//! - `colloquy_interface` - `LanguageModel`, `ResponseCache` and
//!   `AnswerValidator` traits
//! - `colloquy_rate_limit` - Configuration, rate limiting, backoff and usage
//!   tracking
//! - `colloquy_cache` - In-memory response cache with JSON persistence
//! - `colloquy_models` - OpenAI-compatible, Gemini and scripted model clients
//! - `colloquy_jobs` - Interview generation, concurrent execution and ordered
//!   collection
//!
//! This crate re-exports everything for convenience and provides the
//! `colloquy` command-line tool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod job_file;
mod session;
mod telemetry;

pub use colloquy_cache::*;
pub use colloquy_core::*;
pub use colloquy_error::*;
pub use colloquy_interface::*;
pub use colloquy_jobs::*;
pub use colloquy_models::*;
pub use colloquy_rate_limit::*;

pub use job_file::JobFile;
pub use session::{RunOptions, plan_work, run_job};
pub use telemetry::init_console_telemetry;
