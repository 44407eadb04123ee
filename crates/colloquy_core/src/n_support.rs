//! Provider capability records for native multi-completion requests.

use serde::{Deserialize, Serialize};

/// Whether, and how, a provider serves several completions in one call.
///
/// # Examples
///
/// ```
/// use colloquy_core::ModelNSupport;
///
/// let openai = ModelNSupport::native("n", 128);
/// assert!(openai.supports_n);
/// assert!(!ModelNSupport::unsupported().supports_n);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelNSupport {
    /// Whether the provider accepts a completion-count parameter
    pub supports_n: bool,
    /// Name of that parameter
    #[serde(default)]
    pub parameter_name: String,
    /// Provider's cap on completions per call
    #[serde(default = "default_max_value")]
    pub max_value: u32,
}

fn default_max_value() -> u32 {
    1
}

impl ModelNSupport {
    /// A provider that accepts `parameter_name` up to `max_value`.
    pub fn native(parameter_name: impl Into<String>, max_value: u32) -> Self {
        Self {
            supports_n: true,
            parameter_name: parameter_name.into(),
            max_value: max_value.max(1),
        }
    }

    /// A provider with one completion per call.
    pub fn unsupported() -> Self {
        Self {
            supports_n: false,
            parameter_name: String::new(),
            max_value: 1,
        }
    }
}

impl Default for ModelNSupport {
    fn default() -> Self {
        Self::unsupported()
    }
}
