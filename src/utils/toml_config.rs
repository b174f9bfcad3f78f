//! TOML-based configuration for sleuth
//!
//! Providers, models, research limits and the retry policy are declared in a
//! single `sleuth.toml`. API keys never live in the file; providers name the
//! environment variable that holds them, and `.env` is loaded at startup.

use crate::llm::client::ModelParams;
use crate::llm::retry::RetryConfig;
use crate::research::types::ResearchSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on planner fan-out, regardless of configuration.
pub const MAX_SUBTASKS_CAP: usize = 10;

/// Root configuration structure loaded from sleuth.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named LLM provider configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Named model configurations that reference providers
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    #[serde(default)]
    pub research: ResearchConfig,

    /// Transport retry policy applied to every gateway
    #[serde(default)]
    pub retry: RetryConfig,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

// ============= Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Reference to a provider name defined in [providers]
    pub provider: String,

    /// Model name/identifier to use with the provider
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// Ask thinking-capable Ollama models for separate reasoning output
    pub think: Option<bool>,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_model_max_tokens() -> u32 {
    4096
}

impl ModelConfig {
    pub fn params(&self) -> ModelParams {
        ModelParams {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            think: self.think,
        }
    }
}

// ============= Research Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Model used by the planner and the synthesizer
    #[serde(default = "default_lead_model")]
    pub lead_model: String,

    /// Model used by investigation workers
    #[serde(default = "default_worker_model")]
    pub worker_model: String,

    /// Model used by the citation pass; defaults to the lead model
    #[serde(default)]
    pub citation_model: Option<String>,

    /// Fan-out limit, capped at 10
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,

    /// Maximum number of workers running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Maximum capability invocations per worker
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,

    #[serde(default = "default_search_results")]
    pub search_results: usize,

    /// Fetched page text is cut to this many characters before the model sees it
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

fn default_lead_model() -> String {
    "lead".to_string()
}

fn default_worker_model() -> String {
    "worker".to_string()
}

fn default_max_subtasks() -> usize {
    5
}

fn default_concurrency() -> usize {
    3
}

fn default_worker_timeout_secs() -> u64 {
    180
}

fn default_max_tool_calls() -> usize {
    8
}

fn default_search_results() -> usize {
    5
}

fn default_max_page_chars() -> usize {
    8000
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            lead_model: default_lead_model(),
            worker_model: default_worker_model(),
            citation_model: None,
            max_subtasks: default_max_subtasks(),
            concurrency: default_concurrency(),
            worker_timeout_secs: default_worker_timeout_secs(),
            max_tool_calls: default_max_tool_calls(),
            search_results: default_search_results(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

impl ResearchConfig {
    /// Model name the citation pass resolves to.
    pub fn citation_model(&self) -> &str {
        self.citation_model.as_deref().unwrap_or(&self.lead_model)
    }

    /// Runtime limits handed to the coordinator.
    pub fn settings(&self) -> ResearchSettings {
        ResearchSettings {
            max_subtasks: self.max_subtasks.min(MAX_SUBTASKS_CAP),
            concurrency: self.concurrency.max(1),
            worker_timeout: Duration::from_secs(self.worker_timeout_secs),
            max_tool_calls: self.max_tool_calls.max(1),
            search_results: self.search_results,
            max_page_chars: self.max_page_chars,
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    UnusedProvider,
    UnusedModel,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' referenced by model '{1}' does not exist")]
    MissingProvider(String, String),

    #[error("Model '{0}' referenced by research.{1} does not exist")]
    MissingModel(String, String),
}

impl SleuthConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_unchecked(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validating references or environment
    pub fn load_unchecked<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in self.providers.values() {
            if let ProviderConfig::OpenAI { api_key_env, .. } = provider {
                self.validate_env_var(api_key_env)?;
            }
        }

        for (model_name, model_config) in &self.models {
            if !self.providers.contains_key(&model_config.provider) {
                return Err(ConfigError::MissingProvider(
                    model_config.provider.clone(),
                    model_name.clone(),
                ));
            }
        }

        for (role, model) in self.role_models() {
            if !self.models.contains_key(model) {
                return Err(ConfigError::MissingModel(model.to_string(), role.to_string()));
            }
        }

        let research = &self.research;
        if research.concurrency < 1 {
            return Err(ConfigError::ValidationError(
                "research.concurrency must be at least 1".into(),
            ));
        }
        if research.max_subtasks < 1 || research.max_subtasks > MAX_SUBTASKS_CAP {
            return Err(ConfigError::ValidationError(format!(
                "research.max_subtasks must be between 1 and {}",
                MAX_SUBTASKS_CAP
            )));
        }
        if research.max_tool_calls < 1 {
            return Err(ConfigError::ValidationError(
                "research.max_tool_calls must be at least 1".into(),
            ));
        }
        if research.worker_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "research.worker_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Validate configuration with warnings for unused items
    ///
    /// Returns Ok with warnings, or Err if validation fails
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(self.check_unused_providers());
        warnings.extend(self.check_unused_models());
        warnings.sort_by(|a, b| a.message.cmp(&b.message));
        Ok(warnings)
    }

    /// (research key, model name) pairs the pipeline resolves at startup.
    fn role_models(&self) -> [(&'static str, &str); 3] {
        [
            ("lead_model", self.research.lead_model.as_str()),
            ("worker_model", self.research.worker_model.as_str()),
            ("citation_model", self.research.citation_model()),
        ]
    }

    /// Check for providers that aren't referenced by any model
    fn check_unused_providers(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<_> = self.models.values().map(|m| m.provider.as_str()).collect();

        self.providers
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedProvider,
                message: format!(
                    "Provider '{}' is defined but not referenced by any model",
                    name
                ),
            })
            .collect()
    }

    /// Check for models that no research role uses
    fn check_unused_models(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<&str> = self.role_models().iter().map(|(_, m)| *m).collect();

        self.models
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedModel,
                message: format!(
                    "Model '{}' is defined but not used by any research role",
                    name
                ),
            })
            .collect()
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }

    /// Get provider by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Get model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }
}
