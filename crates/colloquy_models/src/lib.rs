//! Language model clients.
//!
//! - `OpenAiCompatibleClient` speaks the chat-completions protocol shared by
//!   OpenAI, Azure OpenAI, Groq and most self-hosted servers, and asks for
//!   several completions through `n`
//! - `GoogleClient` speaks the Gemini `generateContent` protocol and asks for
//!   several completions through `candidateCount`
//! - `ScriptedModel` answers from a fixed script under the `test` service for
//!   dry runs and tests
//!
//! `ModelSpec` is the serializable description of a model used by job files;
//! [`ModelSpec::build`] turns it into a ready client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod google;
mod http;
mod openai;
mod scripted;
mod spec;

pub use google::GoogleClient;
pub use openai::OpenAiCompatibleClient;
pub use scripted::ScriptedModel;
pub use spec::ModelSpec;
