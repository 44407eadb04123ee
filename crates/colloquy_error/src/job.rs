//! Job execution error types.

/// Specific error conditions for job execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum JobErrorKind {
    /// A job needs at least one agent, scenario, model and question
    #[display("Job has no {}", _0)]
    EmptyJob(String),
    /// Repetition count must be at least one
    #[display("Repetition count must be at least 1, got {}", _0)]
    InvalidRepetitions(u32),
    /// Two results arrived for the same original index
    #[display("Duplicate result for original index {}", _0)]
    DuplicateIndex(usize),
    /// Retries exhausted for a work item
    #[display("Gave up on item {} after {} attempts: {}", original_index, attempts, last_error)]
    GaveUp {
        /// Original index of the work item
        original_index: usize,
        /// Number of attempts made
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },
    /// A worker task panicked or was aborted unexpectedly
    #[display("Worker task failed: {}", _0)]
    WorkerPanicked(String),
}

/// Error type for job execution.
///
/// # Examples
///
/// ```
/// use colloquy_error::{JobError, JobErrorKind};
///
/// let err = JobError::new(JobErrorKind::DuplicateIndex(7));
/// assert!(format!("{}", err).contains("7"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Job Error: {} at line {} in {}", kind, line, file)]
pub struct JobError {
    /// The specific error condition
    pub kind: JobErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl JobError {
    /// Create a new JobError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: JobErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
