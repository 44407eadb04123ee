//! Default answer validation.

use crate::AnswerValidator;
use colloquy_core::Question;
use colloquy_error::ValidationError;
use serde_json::Value as JsonValue;
use tracing::trace;

/// Validator used when the caller supplies none.
///
/// - Multiple-choice questions accept any option, matched case-insensitively
///   after trimming whitespace and trailing punctuation; the canonical option
///   text is returned.
/// - Free-text answers that parse as JSON are returned as JSON, otherwise as
///   a trimmed string.
/// - Empty completions are rejected.
///
/// # Examples
///
/// ```
/// use colloquy_core::Question;
/// use colloquy_interface::{AnswerValidator, DefaultValidator};
/// use serde_json::json;
///
/// let q = Question::multiple_choice("mood", "Mood?", vec!["Good".into(), "Bad".into()]);
/// assert_eq!(DefaultValidator.validate(&q, " good.\n").unwrap(), json!("Good"));
/// assert!(DefaultValidator.validate(&q, "purple").is_err());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl AnswerValidator for DefaultValidator {
    fn validate(&self, question: &Question, raw: &str) -> Result<JsonValue, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::new(&question.name, "empty answer"));
        }

        if let Some(options) = &question.options {
            let candidate = trimmed.trim_end_matches(['.', '!', '"', '\'']).trim_start_matches(['"', '\'']);
            return options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(candidate))
                .map(|option| JsonValue::String(option.clone()))
                .ok_or_else(|| {
                    ValidationError::new(
                        &question.name,
                        format!("'{}' is not one of [{}]", candidate, options.join(", ")),
                    )
                });
        }

        match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(value) => {
                trace!(question = %question.name, "Answer parsed as JSON");
                Ok(value)
            }
            Err(_) => Ok(JsonValue::String(trimmed.to_string())),
        }
    }
}
