//! Init command implementation
//!
//! Scaffolds `sleuth.toml` and `.env.example` in a directory.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug, PartialEq, Eq)]
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// sleuth.toml already exists
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// LLM provider to configure (ollama, openai, or both)
    pub provider: String,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing sleuth");

    let base_path = &config.path;
    if !base_path.exists() {
        if let Err(e) = fs::create_dir_all(base_path) {
            output.error(&format!("Failed to create {}: {}", base_path.display(), e));
            return InitResult::Error(e.to_string());
        }
    }

    let config_path = base_path.join("sleuth.toml");
    if config_path.exists() && !config.force {
        output.warning("sleuth.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    if let Err(e) = write_file(&config_path, &generate_sleuth_toml(&config.provider), config.force) {
        output.error(&format!("Failed to create sleuth.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "sleuth.toml");

    let env_example_path = base_path.join(".env.example");
    if env_example_path.exists() && !config.force {
        output.skipped(".env.example", "already exists");
    } else if let Err(e) = write_file(&env_example_path, &generate_env_example(), config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    } else {
        output.created("env", ".env.example");
    }

    output.complete("sleuth initialized successfully!");

    output.header("Next Steps");
    let mut step = 1;
    if config.provider != "ollama" {
        output.info(&format!("{}. Set your API key:", step));
        output.command("cp .env.example .env  # then set OPENAI_API_KEY");
        step += 1;
    }
    if config.provider != "openai" {
        output.info(&format!("{}. Start Ollama and pull the models:", step));
        output.command("ollama serve");
        output.command("ollama pull qwen3:8b");
        step += 1;
    }
    output.info(&format!("{}. Run a research query:", step));
    output.command("sleuth research \"How did async Rust evolve?\"");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(()); // Skip existing files unless force is true
    }
    fs::write(path, content)
}

pub(crate) fn generate_sleuth_toml(provider: &str) -> String {
    let provider_section = match provider {
        "openai" => {
            r#"# OpenAI API (set OPENAI_API_KEY in .env)
[providers.openai]
type = "openai"
api_key_env = "OPENAI_API_KEY"
api_base = "https://api.openai.com/v1"
"#
        }
        "both" => {
            r#"# Ollama - Local inference (no API key required)
[providers.ollama-local]
type = "ollama"
base_url = "http://localhost:11434"

# OpenAI API (set OPENAI_API_KEY in .env)
[providers.openai]
type = "openai"
api_key_env = "OPENAI_API_KEY"
api_base = "https://api.openai.com/v1"
"#
        }
        _ => {
            r#"# Ollama - Local inference (no API key required)
[providers.ollama-local]
type = "ollama"
base_url = "http://localhost:11434"
"#
        }
    };

    // With both providers, the lead runs on OpenAI and workers stay local.
    let (lead_provider, lead_model, worker_provider, worker_model) = match provider {
        "openai" => ("openai", "gpt-4o", "openai", "gpt-4o-mini"),
        "both" => ("openai", "gpt-4o", "ollama-local", "qwen3:8b"),
        _ => ("ollama-local", "qwen3:8b", "ollama-local", "qwen3:8b"),
    };

    format!(
        r#"# sleuth configuration
# Generated by: sleuth init

[logging]
# RUST_LOG overrides this filter
level = "info"
# pretty or json
format = "pretty"

# =============================================================================
# LLM Providers
# =============================================================================
{provider_section}
# =============================================================================
# Models
# =============================================================================
[models.lead]
provider = "{lead_provider}"
model = "{lead_model}"
temperature = 0.3
max_tokens = 4096

[models.worker]
provider = "{worker_provider}"
model = "{worker_model}"
temperature = 0.3
max_tokens = 4096

# =============================================================================
# Research pipeline
# =============================================================================
[research]
lead_model = "lead"
worker_model = "worker"
# citation_model = "lead"
max_subtasks = 5
concurrency = 3
worker_timeout_secs = 180
max_tool_calls = 8
search_results = 5
max_page_chars = 8000

[retry]
max_retries = 1
initial_delay_ms = 500
max_delay_ms = 10000
backoff_multiplier = 2.0
"#
    )
}

pub(crate) fn generate_env_example() -> String {
    r#"# sleuth environment
# Copy to .env and fill in the values you need.

# Required for OpenAI-compatible providers
OPENAI_API_KEY=

# Log filter, overrides [logging].level
# RUST_LOG=sleuth=debug
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::toml_config::{ProviderConfig, SleuthConfig};
    use tempfile::TempDir;

    fn init_config(temp_dir: &TempDir, provider: &str, force: bool) -> InitConfig {
        InitConfig {
            path: temp_dir.path().to_path_buf(),
            force,
            provider: provider.to_string(),
        }
    }

    #[test]
    fn test_generated_ollama_config_is_valid() {
        let config = SleuthConfig::from_toml_str(&generate_sleuth_toml("ollama")).unwrap();
        config.validate().unwrap();
        assert!(config.validate_with_warnings().unwrap().is_empty());
        assert_eq!(config.research.lead_model, "lead");
        assert!(matches!(
            config.get_provider("ollama-local"),
            Some(ProviderConfig::Ollama { .. })
        ));
    }

    #[test]
    fn test_generated_configs_parse() {
        for provider in ["openai", "both"] {
            let config = SleuthConfig::from_toml_str(&generate_sleuth_toml(provider)).unwrap();
            assert_eq!(config.get_model("lead").unwrap().provider, "openai");
            assert_eq!(config.research.settings().concurrency, 3);
        }
        let both = SleuthConfig::from_toml_str(&generate_sleuth_toml("both")).unwrap();
        assert_eq!(both.get_model("worker").unwrap().provider, "ollama-local");
    }

    #[test]
    fn test_generate_env_example() {
        let content = generate_env_example();
        assert!(content.contains("OPENAI_API_KEY="));
        assert!(content.contains("RUST_LOG"));
    }

    #[test]
    fn test_write_file_skips_existing_without_force() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("existing.txt");
        fs::write(&path, "original").unwrap();

        write_file(&path, "new content", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");

        write_file(&path, "new content", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new content");
    }

    #[test]
    fn test_run_creates_all_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let result = run(init_config(&temp_dir, "ollama", false), &Output::no_color());

        assert_eq!(result, InitResult::Success);
        assert!(temp_dir.path().join("sleuth.toml").exists());
        assert!(temp_dir.path().join(".env.example").exists());
    }

    #[test]
    fn test_run_creates_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let nested = temp_dir.path().join("project/research");
        let result = run(
            InitConfig {
                path: nested.clone(),
                force: false,
                provider: "ollama".into(),
            },
            &Output::no_color(),
        );
        assert_eq!(result, InitResult::Success);
        assert!(nested.join("sleuth.toml").exists());
    }

    #[test]
    fn test_run_already_exists_without_force() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("sleuth.toml"), "# existing").unwrap();

        let result = run(init_config(&temp_dir, "ollama", false), &Output::no_color());
        assert_eq!(result, InitResult::AlreadyExists);
        let content = fs::read_to_string(temp_dir.path().join("sleuth.toml")).unwrap();
        assert_eq!(content, "# existing");
    }

    #[test]
    fn test_run_force_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("sleuth.toml"), "# existing").unwrap();

        let result = run(init_config(&temp_dir, "openai", true), &Output::no_color());
        assert_eq!(result, InitResult::Success);
        let content = fs::read_to_string(temp_dir.path().join("sleuth.toml")).unwrap();
        assert!(content.contains("[providers.openai]"));
    }
}
