//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for the language model gateways the
//! research pipeline calls. Provider-specific wire formats stay behind the
//! [`LLMClient`] trait, so planner, workers and synthesizer only ever see
//! [`ConversationMessage`]s in and [`LLMResponse`]s out.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - Runtime description of a concrete provider/model pair
//! - [`RetryingClient`] - Bounded exponential backoff around any client
//! - [`ProviderRegistry`] - Builds clients from `sleuth.toml`
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Example
//!
//! ```ignore
//! use sleuth::llm::{ConversationMessage, ProviderRegistry};
//!
//! let registry = ProviderRegistry::from_config(&config);
//! let client = registry.create_client_for_model("lead")?;
//! let response = client
//!     .complete(&[ConversationMessage::user("What is 2+2?")], &[], &cancel)
//!     .await?;
//! println!("{}", response.content);
//! ```

/// Core LLM client trait and message types.
pub mod client;
/// Registry for managing multiple LLM provider instances.
pub mod provider_registry;
/// Retry wrapper for transient transport failures.
pub mod retry;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{
    ConversationMessage, LLMClient, LLMResponse, MessageRole, ModelParams, Provider,
};
pub use provider_registry::{ProviderRegistry, ResearchClients};
pub use retry::{RetryConfig, RetryingClient};
