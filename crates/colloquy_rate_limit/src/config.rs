//! Configuration structures for runs, retries, concurrency and providers.
//!
//! The configuration system supports:
//! - Bundled defaults (include_str! from colloquy.toml)
//! - User overrides (./colloquy.toml or ~/.config/colloquy/colloquy.toml)
//! - Automatic merging with user values taking precedence

use crate::Tier;
use colloquy_core::ModelNSupport;
use colloquy_error::{ColloquyError, ColloquyResult, ConfigError};
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Model-specific rate limit overrides.
///
/// All fields are optional - only specified fields override tier defaults.
///
/// ```toml
/// [providers.openai.tiers.tier1.models."gpt-4o"]
/// rpm = 100
/// tpm = 30_000
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ModelTierConfig {
    /// Requests per minute limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,

    /// Tokens per minute limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,

    /// Maximum concurrent requests (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
}

/// Configuration for a specific API tier.
///
/// All limits are optional, where `None` indicates unlimited.
///
/// ```toml
/// [providers.google.tiers.free]
/// name = "Free"
/// rpm = 10
/// tpm = 250_000
/// max_concurrent = 1
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Name of the tier (e.g., "Free", "Tier 1")
    pub name: String,

    /// Requests per minute limit (tier-level default)
    #[serde(default)]
    pub rpm: Option<u32>,

    /// Tokens per minute limit (tier-level default)
    #[serde(default)]
    pub tpm: Option<u64>,

    /// Maximum concurrent requests (tier-level default)
    #[serde(default)]
    pub max_concurrent: Option<u32>,

    /// Model-specific rate limit overrides
    #[serde(default)]
    pub models: HashMap<String, ModelTierConfig>,
}

impl Tier for TierConfig {
    fn rpm(&self) -> Option<u32> {
        self.rpm
    }

    fn tpm(&self) -> Option<u64> {
        self.tpm
    }

    fn max_concurrent(&self) -> Option<u32> {
        self.max_concurrent
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TierConfig {
    /// An unnamed tier with no limits.
    pub fn unlimited() -> Self {
        Self {
            name: "Unlimited".to_string(),
            rpm: None,
            tpm: None,
            max_concurrent: None,
            models: HashMap::new(),
        }
    }

    /// Get a tier configuration with model-specific overrides applied.
    ///
    /// Returns a clone of the tier-level config if no model-specific
    /// overrides exist.
    pub fn for_model(&self, model_name: &str) -> TierConfig {
        if let Some(model_config) = self.models.get(model_name) {
            TierConfig {
                name: self.name.clone(),
                rpm: model_config.rpm.or(self.rpm),
                tpm: model_config.tpm.or(self.tpm),
                max_concurrent: model_config.max_concurrent.or(self.max_concurrent),
                models: HashMap::new(),
            }
        } else {
            self.clone()
        }
    }
}

fn default_tier_name() -> String {
    "default".to_string()
}

/// Configuration for a specific provider (inference service).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name of the default tier for this provider
    #[serde(default = "default_tier_name")]
    pub default_tier: String,

    /// Map of tier name to tier configuration
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,

    /// Native multi-completion capability of this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_support: Option<ModelNSupport>,
}

/// Settings that shape a single run.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct RunSettings {
    /// Completions requested per interview (N)
    #[serde(default = "default_repetitions")]
    repetitions: u32,

    /// Abort the whole run on the first recorded exception
    #[serde(default)]
    stop_on_exception: bool,

    /// Upper bound on a single model call, in seconds
    #[serde(default = "default_call_timeout_secs")]
    call_timeout_secs: u64,
}

fn default_repetitions() -> u32 {
    1
}

fn default_call_timeout_secs() -> u64 {
    120
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            stop_on_exception: false,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl RunSettings {
    /// Per-call timeout as a duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Retry settings for rate-limit-class and transport failures.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct RetryConfig {
    /// Attempts allowed after the first one before giving up
    #[serde(default = "default_max_retries")]
    max_retries: u32,

    /// Base delay of the backoff sequence, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,

    /// Cap on any single backoff delay, in seconds
    #[serde(default = "default_max_backoff_secs")]
    max_backoff_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Worker pool sizing and throughput sampling.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct ConcurrencyConfig {
    /// Workers available when the run starts
    #[serde(default = "default_initial_workers")]
    initial_workers: usize,

    /// Ceiling the pool never grows past
    #[serde(default = "default_max_workers")]
    max_workers: usize,

    /// Fraction of the token limit below which the pool may grow
    #[serde(default = "default_growth_threshold")]
    growth_threshold: f64,

    /// How often the pool supervisor samples throughput, in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    sample_interval_ms: u64,

    /// How often progress is reported, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    progress_interval_ms: u64,

    /// Tokens-per-minute limit the pool supervisor measures against
    #[serde(default)]
    tokens_per_minute: Option<u64>,

    /// Requests-per-minute limit the pool supervisor measures against
    #[serde(default)]
    requests_per_minute: Option<u64>,

    /// Trailing window used for rate computation, in seconds
    #[serde(default = "default_usage_window_secs")]
    usage_window_secs: u64,

    /// How long usage records are kept, in seconds
    #[serde(default = "default_usage_retention_secs")]
    usage_retention_secs: u64,
}

fn default_initial_workers() -> usize {
    4
}

fn default_max_workers() -> usize {
    64
}

fn default_growth_threshold() -> f64 {
    0.3
}

fn default_sample_interval_ms() -> u64 {
    5000
}

fn default_progress_interval_ms() -> u64 {
    2000
}

fn default_usage_window_secs() -> u64 {
    60
}

fn default_usage_retention_secs() -> u64 {
    600
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial_workers: default_initial_workers(),
            max_workers: default_max_workers(),
            growth_threshold: default_growth_threshold(),
            sample_interval_ms: default_sample_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            tokens_per_minute: None,
            requests_per_minute: None,
            usage_window_secs: default_usage_window_secs(),
            usage_retention_secs: default_usage_retention_secs(),
        }
    }
}

impl ConcurrencyConfig {
    /// Sampling interval of the pool supervisor.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Progress reporting interval.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Rate computation window.
    pub fn usage_window(&self) -> Duration {
        Duration::from_secs(self.usage_window_secs)
    }

    /// Usage record retention.
    pub fn usage_retention(&self) -> Duration {
        Duration::from_secs(self.usage_retention_secs)
    }
}

/// Result collector settings.
#[derive(
    Debug, Clone, PartialEq, Default, Serialize, Deserialize, derive_getters::Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct CollectorConfig {
    /// Fixed release batch size; sized from the job when unset
    #[serde(default)]
    release_batch_size: Option<usize>,
}

/// Top-level Colloquy configuration.
///
/// Loads configuration from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from colloquy.toml)
/// 2. User override (~/.config/colloquy/colloquy.toml, then ./colloquy.toml)
///
/// # Example
///
/// ```no_run
/// use colloquy_rate_limit::ColloquyConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ColloquyConfig::load()?;
/// let openai = config.n_support_table();
/// println!("openai native n: {:?}", openai.get("openai"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ColloquyConfig {
    /// Run settings
    #[serde(default)]
    pub run: RunSettings,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Collector settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl ColloquyConfig {
    /// Load configuration from a specific file path layered over the bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ColloquyResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ColloquyError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                ColloquyError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (colloquy.toml shipped with library)
    /// 2. User config in home directory (~/.config/colloquy/colloquy.toml)
    /// 3. User config in current directory (./colloquy.toml)
    ///
    /// User config files are optional and silently skipped if not found.
    #[instrument]
    pub fn load() -> ColloquyResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/colloquy/colloquy.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("colloquy").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| {
                ColloquyError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                ColloquyError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Bundled defaults only.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bundled file is malformed.
    pub fn bundled() -> ColloquyResult<Self> {
        let config: Self = toml_from_str(DEFAULT_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first violated constraint.
    pub fn validate(&self) -> ColloquyResult<()> {
        let c = &self.concurrency;
        if c.initial_workers == 0 {
            return Err(ConfigError::new("concurrency.initial_workers must be at least 1").into());
        }
        if c.max_workers < c.initial_workers {
            return Err(ConfigError::new(format!(
                "concurrency.max_workers ({}) is below initial_workers ({})",
                c.max_workers, c.initial_workers
            ))
            .into());
        }
        if c.growth_threshold <= 0.0 || c.growth_threshold > 1.0 {
            return Err(ConfigError::new(format!(
                "concurrency.growth_threshold must be in (0.0, 1.0], got {}",
                c.growth_threshold
            ))
            .into());
        }
        if c.usage_retention_secs < c.usage_window_secs {
            return Err(ConfigError::new(
                "concurrency.usage_retention_secs must cover usage_window_secs",
            )
            .into());
        }
        if self.run.repetitions == 0 {
            return Err(ConfigError::new("run.repetitions must be at least 1").into());
        }
        for (name, provider) in &self.providers {
            if let Some(support) = &provider.n_support
                && support.supports_n
                && support.parameter_name.is_empty()
            {
                return Err(ConfigError::new(format!(
                    "providers.{}.n_support needs a parameter_name",
                    name
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Get tier configuration for a provider.
    ///
    /// Returns `None` if the provider or tier is not configured.
    #[instrument(skip(self))]
    pub fn get_tier(&self, provider: &str, tier_name: Option<&str>) -> Option<TierConfig> {
        let provider_config = self.providers.get(provider)?;

        let tier = tier_name.unwrap_or(&provider_config.default_tier);

        debug!(provider, tier, "Looking up tier configuration");

        provider_config.tiers.get(tier).cloned()
    }

    /// Native-N capability of every provider that declares one.
    pub fn n_support_table(&self) -> HashMap<String, ModelNSupport> {
        self.providers
            .iter()
            .filter_map(|(name, provider)| {
                provider
                    .n_support
                    .clone()
                    .map(|support| (name.clone(), support))
            })
            .collect()
    }
}

const DEFAULT_CONFIG: &str = include_str!("../../../colloquy.toml");

fn toml_from_str(text: &str) -> ColloquyResult<ColloquyConfig> {
    Config::builder()
        .add_source(File::from_str(text, FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| {
            ColloquyError::from(ConfigError::new(format!(
                "Failed to parse configuration: {}",
                e
            )))
        })
}
