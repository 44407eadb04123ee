//! Core data types for the Colloquy interview execution framework.
//!
//! This crate provides the plain data shared by every other Colloquy crate:
//! the participants of an interview (agents, scenarios, surveys), the request
//! and response shapes exchanged with a model, usage records, provider
//! capability records and cache keys.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod cache;
mod n_support;
mod question;
mod request;
mod scenario;
mod usage;

pub use agent::Agent;
pub use cache::{CacheKey, CachedResponse};
pub use n_support::ModelNSupport;
pub use question::{Question, Survey};
pub use request::{
    CompletionRequest, CompletionRequestBuilder, ModelResponse, NativeCompletions, TokenUsage,
};
pub use scenario::Scenario;
pub use usage::UsageRecord;
