//! Survey questions.

use serde::{Deserialize, Serialize};

/// One question asked of every agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Key under which the answer is stored in a result
    pub name: String,
    /// Question text, possibly containing `{{key}}` scenario placeholders
    pub text: String,
    /// Allowed answers for multiple-choice questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Question {
    /// Create a free-text question.
    pub fn free_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            options: None,
        }
    }

    /// Create a multiple-choice question.
    pub fn multiple_choice(
        name: impl Into<String>,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            options: Some(options),
        }
    }

    /// Question text with answer instructions appended.
    pub fn prompt_text(&self, rendered_text: &str) -> String {
        match &self.options {
            Some(options) => format!(
                "{}\nAnswer with exactly one of: {}",
                rendered_text,
                options.join(", ")
            ),
            None => rendered_text.to_string(),
        }
    }
}

/// Ordered questions asked in a single interview.
///
/// # Examples
///
/// ```
/// use colloquy_core::{Question, Survey};
///
/// let survey = Survey::new(vec![Question::free_text("q1", "How are you?")]);
/// assert_eq!(survey.len(), 1);
/// assert!(survey.question("q1").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Survey {
    /// Questions in asking order
    pub questions: Vec<Question>,
}

impl Survey {
    /// Create a survey from questions.
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the survey has no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Look up a question by name.
    pub fn question(&self, name: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.name == name)
    }
}
