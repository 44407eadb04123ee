//! Scenario values substituted into question templates.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A set of named values that parameterize question text.
///
/// Question text may reference scenario values as `{{key}}`.
///
/// # Examples
///
/// ```
/// use colloquy_core::Scenario;
/// use serde_json::json;
///
/// let scenario = Scenario::new("weekday").with_value("day", json!("Monday"));
/// assert_eq!(scenario.render("How do you feel on {{day}}?"), "How do you feel on Monday?");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, derive_getters::Getters)]
pub struct Scenario {
    /// Display name used in results and diagnostics
    name: String,
    /// Template values
    #[serde(default)]
    values: BTreeMap<String, JsonValue>,
}

impl Scenario {
    /// Create an empty scenario.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a template value.
    pub fn with_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Substitute `{{key}}` placeholders in a template.
    ///
    /// Unknown placeholders are left untouched.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in &self.values {
            let placeholder = format!("{{{{{}}}}}", key);
            if rendered.contains(&placeholder) {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&placeholder, &text);
            }
        }
        rendered
    }
}
