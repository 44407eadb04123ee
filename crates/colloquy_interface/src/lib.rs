//! Trait definitions for the Colloquy interview execution framework.
//!
//! The execution core treats models, caches and answer validation as external
//! collaborators. This crate defines the seams they plug into.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;
mod validator;

pub use traits::{AnswerValidator, LanguageModel, ResponseCache};
pub use validator::DefaultValidator;
