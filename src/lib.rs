//! # sleuth - multi-agent deep research
//!
//! sleuth answers a research question by splitting it into independent
//! sub-topics, investigating them in parallel with web search and page
//! fetching, merging the findings into one report and citing every claim.
//!
//! ## Overview
//!
//! sleuth can be used in two ways:
//!
//! 1. **As a command line tool** - Run the `sleuth` binary
//! 2. **As a library** - Embed the pipeline and consume its event stream
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use sleuth::{DaedraCapabilities, ProviderRegistry, ResearchCoordinator, ResearchQuery, SleuthConfig};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SleuthConfig::load("sleuth.toml")?;
//!     let clients = ProviderRegistry::from_config(&config).research_clients(&config.research)?;
//!     let coordinator = ResearchCoordinator::new(
//!         clients,
//!         Arc::new(DaedraCapabilities::new()),
//!         config.research.settings(),
//!     );
//!
//!     let mut events = coordinator.stream(ResearchQuery::new("How did async Rust evolve?"));
//!     while let Some(event) = events.next().await {
//!         print!("{}", event.to_sse());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI-compatible APIs (default) |
//! | `daedra` | DuckDuckGo search and page fetching (default) |
//!
//! ## Modules
//!
//! - [`research`] - Planner, dispatcher, workers, synthesis, citations, events
//! - [`llm`] - Language model gateways, retry and provider registry
//! - [`tools`] - Web capabilities offered to workers
//! - [`utils`] - Configuration and logging
//! - [`cli`] - Command line parsing and output
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command line interface.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// Multi-agent research pipeline.
pub mod research;
/// Web capabilities (search, fetch).
pub mod tools;
/// Core types and error handling.
pub mod types;
/// Configuration and logging utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, LLMResponse, Provider, ProviderRegistry, ResearchClients};
pub use research::{
    Bibliography, EventPublisher, EventStream, FinalReport, ResearchCoordinator, ResearchEvent,
    ResearchQuery, ResearchSettings,
};
#[cfg(feature = "daedra")]
pub use tools::DaedraCapabilities;
pub use tools::WebCapabilities;
pub use types::{AppError, Result};
pub use utils::toml_config::SleuthConfig;
