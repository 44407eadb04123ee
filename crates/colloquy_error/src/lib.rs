//! Error types for the Colloquy library.
//!
//! This crate provides the foundation error types used throughout the Colloquy workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use colloquy_error::{ColloquyResult, ConfigError};
//!
//! fn load() -> ColloquyResult<String> {
//!     Err(ConfigError::new("missing [run] section"))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod job;
mod model;
mod validation;

pub use cache::CacheError;
pub use config::ConfigError;
pub use error::{ColloquyError, ColloquyErrorKind, ColloquyResult};
pub use job::{JobError, JobErrorKind};
pub use model::{ModelError, ModelErrorKind, RetryableError};
pub use validation::ValidationError;
