//! Provider Registry for managing multiple LLM providers
//!
//! Named providers and models come from `sleuth.toml`. The registry resolves a
//! model name through its provider, reads the API key from the environment and
//! hands back a client wrapped in the configured retry policy.
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::from_config(&config);
//! let clients = registry.research_clients(&config.research)?;
//! ```

use crate::llm::client::{LLMClient, Provider};
use crate::llm::retry::{RetryConfig, RetryingClient};
use crate::types::{AppError, Result};
use crate::utils::toml_config::{ModelConfig, ProviderConfig, ResearchConfig, SleuthConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for managing multiple named LLM providers
pub struct ProviderRegistry {
    /// Provider configurations keyed by name
    providers: HashMap<String, ProviderConfig>,
    /// Model configurations keyed by name
    models: HashMap<String, ModelConfig>,
    retry: RetryConfig,
}

/// The three gateway roles a research run needs.
#[derive(Clone)]
pub struct ResearchClients {
    /// Planner and synthesizer
    pub lead: Arc<dyn LLMClient>,
    pub worker: Arc<dyn LLMClient>,
    pub citation: Arc<dyn LLMClient>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Create a provider registry from TOML configuration
    pub fn from_config(config: &SleuthConfig) -> Self {
        Self {
            providers: config.providers.clone(),
            models: config.models.clone(),
            retry: config.retry.clone(),
        }
    }

    /// Register a provider configuration
    pub fn register_provider(&mut self, name: &str, config: ProviderConfig) {
        self.providers.insert(name.to_string(), config);
    }

    /// Register a model configuration
    pub fn register_model(&mut self, name: &str, config: ModelConfig) {
        self.models.insert(name.to_string(), config);
    }

    pub fn set_retry(&mut self, retry: RetryConfig) {
        self.retry = retry;
    }

    /// Get a model configuration by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Get all model names, sorted
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a model name into a concrete provider description.
    pub fn resolve(&self, model_name: &str) -> Result<Provider> {
        let model_config = self.get_model(model_name).ok_or_else(|| {
            AppError::Configuration(format!("Model '{}' not found in configuration", model_name))
        })?;

        let provider_config = self.providers.get(&model_config.provider).ok_or_else(|| {
            AppError::Configuration(format!(
                "Provider '{}' referenced by model '{}' not found",
                model_config.provider, model_name
            ))
        })?;

        let params = model_config.params();
        match provider_config {
            ProviderConfig::Ollama { base_url } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model_config.model.clone(),
                params,
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
            } => {
                let api_key = std::env::var(api_key_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' for provider '{}' is not set",
                        api_key_env, model_config.provider
                    ))
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model_config.model.clone(),
                    params,
                })
            }
        }
    }

    /// Create an LLM client for a specific model by name
    ///
    /// This resolves the model -> provider chain, creates the client and wraps it
    /// in the registry's retry policy.
    pub fn create_client_for_model(&self, model_name: &str) -> Result<Arc<dyn LLMClient>> {
        let client = self.resolve(model_name)?.create_client()?;
        if self.retry.max_retries == 0 {
            return Ok(client);
        }
        Ok(Arc::new(RetryingClient::new(client, self.retry.clone())))
    }

    /// Build the lead, worker and citation clients named in `[research]`.
    pub fn research_clients(&self, research: &ResearchConfig) -> Result<ResearchClients> {
        let lead = self.create_client_for_model(&research.lead_model)?;
        let worker = if research.worker_model == research.lead_model {
            lead.clone()
        } else {
            self.create_client_for_model(&research.worker_model)?
        };
        let citation = if research.citation_model() == research.lead_model {
            lead.clone()
        } else {
            self.create_client_for_model(research.citation_model())?
        };
        Ok(ResearchClients {
            lead,
            worker,
            citation,
        })
    }

    /// Check if a model exists in the registry
    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
