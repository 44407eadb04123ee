//! Tests for the scripted model and model specs.

use colloquy_core::{CompletionRequest, NativeCompletions};
use colloquy_error::{ColloquyErrorKind, ModelErrorKind};
use colloquy_interface::LanguageModel;
use colloquy_models::{ModelSpec, ScriptedModel};
use serde_json::json;

fn request(n: Option<u32>) -> CompletionRequest {
    CompletionRequest::builder()
        .model("scripted")
        .user_prompt("Do you like it?")
        .completions(n.map(|count| NativeCompletions {
            parameter_name: "n".to_string(),
            count,
        }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_scripted_model_returns_one_choice_per_completion() -> anyhow::Result<()> {
    let model = ScriptedModel::new("scripted", vec!["yes".into(), "no".into(), "maybe".into()]);

    let response = model.complete(&request(Some(4))).await?;
    let choices = response.raw["choices"].as_array().unwrap();
    assert_eq!(choices.len(), 4);
    assert_eq!(choices[0]["message"]["content"], json!("yes"));
    assert_eq!(choices[3]["message"]["content"], json!("yes"));
    assert_eq!(model.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_scripted_model_advances_between_calls() -> anyhow::Result<()> {
    let model = ScriptedModel::new("scripted", vec!["a".into(), "b".into()]);
    let first = model.complete(&request(None)).await?;
    let second = model.complete(&request(None)).await?;
    assert_eq!(first.raw["choices"][0]["message"]["content"], json!("a"));
    assert_eq!(second.raw["choices"][0]["message"]["content"], json!("b"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_scripted_model_delay_uses_tokio_clock() -> anyhow::Result<()> {
    let model = ScriptedModel::new("slow", vec!["ok".into()])
        .with_delay(std::time::Duration::from_secs(30));
    let started = tokio::time::Instant::now();
    model.complete(&request(None)).await?;
    assert!(started.elapsed() >= std::time::Duration::from_secs(30));
    Ok(())
}

#[test]
fn test_model_spec_parses_from_toml() -> anyhow::Result<()> {
    let spec: ModelSpec = toml::from_str(
        r#"
name = "gpt-4o-mini"
service = "openai"
api_key_env = "MY_KEY"
parameters = { temperature = 0.5 }
"#,
    )?;
    assert_eq!(spec.name(), "gpt-4o-mini");
    assert_eq!(spec.api_key_env().as_deref(), Some("MY_KEY"));
    assert_eq!(spec.parameters()["temperature"], json!(0.5));
    Ok(())
}

#[test]
fn test_test_service_builds_without_credentials() -> anyhow::Result<()> {
    let spec = ModelSpec::new("dry-run", "test").with_script(vec!["yes".to_string()]);
    let model = spec.build()?;
    assert_eq!(model.inference_service(), "test");
    assert_eq!(model.model_name(), "dry-run");
    Ok(())
}

#[test]
fn test_missing_api_key_is_reported() {
    let spec = ModelSpec::new("gpt-4o", "openai")
        .with_api_key_env("COLLOQUY_TEST_KEY_THAT_IS_NEVER_SET".to_string());
    let err = spec.build().err().unwrap();
    match err.kind() {
        ColloquyErrorKind::Model(e) => {
            assert!(matches!(e.kind, ModelErrorKind::MissingApiKey(_)))
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unknown_service_without_endpoint_is_rejected() {
    let spec = ModelSpec::new("m", "mystery");
    assert!(spec.build().is_err());
}
