//! Tests for the layered configuration system.

use colloquy_rate_limit::{ColloquyConfig, ModelTierConfig, Tier, TierConfig};
use std::collections::HashMap;
use std::io::Write;

#[test]
fn test_load_bundled_defaults() {
    let config = ColloquyConfig::bundled().unwrap();

    assert!(config.providers.contains_key("openai"));
    let google = &config.providers["google"];
    let free = &google.tiers["free"];
    assert_eq!(free.name, "Free");
    assert_eq!(free.rpm, Some(10));
    assert_eq!(free.tpm, Some(250_000));
    assert_eq!(free.max_concurrent, Some(1));

    assert_eq!(*config.run.repetitions(), 1);
    assert!(!*config.run.stop_on_exception());
    assert_eq!(*config.concurrency.initial_workers(), 4);
    assert_eq!(*config.collector.release_batch_size(), None);
}

#[test]
fn test_tier_config_implements_tier_trait() {
    let tier = TierConfig {
        name: "Test Tier".to_string(),
        rpm: Some(100),
        tpm: Some(500_000),
        max_concurrent: Some(5),
        models: HashMap::new(),
    };

    assert_eq!(tier.rpm(), Some(100));
    assert_eq!(tier.tpm(), Some(500_000));
    assert_eq!(tier.max_concurrent(), Some(5));
    assert_eq!(tier.name(), "Test Tier");
}

#[test]
fn test_get_tier_with_default() {
    let config = ColloquyConfig::bundled().unwrap();
    let tier = config.get_tier("google", None).unwrap();
    assert_eq!(tier.name, "Free");
}

#[test]
fn test_get_tier_with_specific_name() {
    let config = ColloquyConfig::bundled().unwrap();
    let tier = config.get_tier("google", Some("payasyougo")).unwrap();
    assert_eq!(tier.name, "Pay-as-you-go");
    assert!(config.get_tier("google", Some("platinum")).is_none());
    assert!(config.get_tier("nobody", None).is_none());
}

#[test]
fn test_model_override_falls_back_to_tier() {
    let mut models = HashMap::new();
    models.insert(
        "gpt-4o".to_string(),
        ModelTierConfig {
            rpm: Some(20),
            ..Default::default()
        },
    );
    let tier = TierConfig {
        name: "Tier 1".to_string(),
        rpm: Some(500),
        tpm: Some(200_000),
        max_concurrent: None,
        models,
    };

    let specific = tier.for_model("gpt-4o");
    assert_eq!(specific.rpm, Some(20));
    assert_eq!(specific.tpm, Some(200_000));
    assert_eq!(tier.for_model("other").rpm, Some(500));
}

#[test]
fn test_n_support_table() {
    let config = ColloquyConfig::bundled().unwrap();
    let table = config.n_support_table();

    let openai = &table["openai"];
    assert!(openai.supports_n);
    assert_eq!(openai.parameter_name, "n");
    assert_eq!(openai.max_value, 128);

    let google = &table["google"];
    assert_eq!(google.parameter_name, "candidateCount");
    assert_eq!(google.max_value, 8);

    assert!(!table["anthropic"].supports_n);
}

#[test]
fn test_config_from_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[run]
repetitions = 7
stop_on_exception = true

[concurrency]
initial_workers = 2
max_workers = 8

[providers.openai.n_support]
supports_n = true
parameter_name = "n"
max_value = 4
"#
    )
    .unwrap();

    let config = ColloquyConfig::from_file(file.path()).unwrap();
    assert_eq!(*config.run.repetitions(), 7);
    assert!(*config.run.stop_on_exception());
    assert_eq!(*config.run.call_timeout_secs(), 120);
    assert_eq!(*config.concurrency.max_workers(), 8);
    assert_eq!(config.n_support_table()["openai"].max_value, 4);
    // Untouched sections keep bundled values.
    assert_eq!(*config.retry.max_retries(), 5);
}

#[test]
fn test_config_from_file_rejects_invalid_values() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[concurrency]
growth_threshold = 1.5
"#
    )
    .unwrap();

    assert!(ColloquyConfig::from_file(file.path()).is_err());
}

#[test]
fn test_config_from_missing_file_fails() {
    assert!(ColloquyConfig::from_file("/definitely/not/here/colloquy.toml").is_err());
}
