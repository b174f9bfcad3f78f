//! Loading `sleuth.toml` from disk.

use sleuth::utils::toml_config::{ConfigError, LogFormat, SleuthConfig};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const OLLAMA_CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[providers.ollama-local]
type = "ollama"

[models.lead]
provider = "ollama-local"
model = "qwen3:8b"

[models.worker]
provider = "ollama-local"
model = "qwen3:4b"
temperature = 0.1

[research]
lead_model = "lead"
worker_model = "worker"
concurrency = 4
worker_timeout_secs = 90
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("sleuth.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, OLLAMA_CONFIG);

    let config = SleuthConfig::load(&path).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.research.citation_model(), "lead");

    let settings = config.research.settings();
    assert_eq!(settings.concurrency, 4);
    assert_eq!(settings.worker_timeout, Duration::from_secs(90));
    assert_eq!(settings.max_subtasks, 5);
    assert!(config.validate_with_warnings().unwrap().is_empty());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = SleuthConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn test_invalid_toml() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[research\nlead_model = ");
    let err = SleuthConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_unknown_provider_reference() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &OLLAMA_CONFIG.replace(
            "provider = \"ollama-local\"\nmodel = \"qwen3:4b\"",
            "provider = \"nowhere\"\nmodel = \"qwen3:4b\"",
        ),
    );

    let err = SleuthConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::MissingProvider(ref p, ref m) if p == "nowhere" && m == "worker"));
}

#[test]
fn test_missing_api_key_env() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[providers.openai]
type = "openai"
api_key_env = "SLEUTH_TEST_KEY_THAT_IS_NEVER_SET"

[models.lead]
provider = "openai"
model = "gpt-4o"

[research]
lead_model = "lead"
worker_model = "lead"
"#,
    );

    let err = SleuthConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "SLEUTH_TEST_KEY_THAT_IS_NEVER_SET"));

    // Structure is still readable without the environment.
    let config = SleuthConfig::load_unchecked(&path).unwrap();
    assert_eq!(config.research.lead_model, "lead");
}
