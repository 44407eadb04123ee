//! Answer validation errors.

/// A model answer that could not be interpreted for its question.
///
/// Validation failures are never retried: the same prompt is assumed to
/// produce an equally uninterpretable answer.
///
/// # Examples
///
/// ```
/// use colloquy_error::ValidationError;
///
/// let err = ValidationError::new("mood", "'purple' is not one of [happy, sad]");
/// assert_eq!(err.question, "mood");
/// assert!(format!("{}", err).contains("purple"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Validation Error for question '{}': {} at line {} in {}", question, message, line, file)]
pub struct ValidationError {
    /// Name of the question whose answer failed validation
    pub question: String,
    /// What was wrong with the answer
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ValidationError {
    /// Create a new ValidationError at the current location.
    #[track_caller]
    pub fn new(question: impl Into<String>, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            question: question.into(),
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
