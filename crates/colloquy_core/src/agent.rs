//! Simulated interview respondents.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A respondent persona answering survey questions.
///
/// Traits are rendered into the system prompt of every call made on the
/// agent's behalf.
///
/// # Examples
///
/// ```
/// use colloquy_core::Agent;
/// use serde_json::json;
///
/// let agent = Agent::new("nurse").with_trait("age", json!(34));
/// assert!(agent.persona().contains("age: 34"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Agent {
    /// Display name used in results and diagnostics
    name: String,
    /// Persona attributes
    #[serde(default)]
    traits: BTreeMap<String, JsonValue>,
    /// Free-form instruction prepended to the persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction: Option<String>,
}

impl Agent {
    /// Create an agent with no traits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: BTreeMap::new(),
            instruction: None,
        }
    }

    /// Add a persona trait.
    pub fn with_trait(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.traits.insert(key.into(), value);
        self
    }

    /// Set the instruction prepended to the persona.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Render the system prompt describing this agent.
    pub fn persona(&self) -> String {
        let mut prompt = self
            .instruction
            .clone()
            .unwrap_or_else(|| "You are answering questions as if you were a human.".to_string());

        if !self.traits.is_empty() {
            prompt.push_str(" Your traits:");
            for (key, value) in &self.traits {
                let rendered = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!("\n{}: {}", key, rendered));
            }
        }

        prompt
    }
}
