//! Multi-Agent Research Pipeline
//!
//! A research run decomposes a query, investigates the pieces in parallel and
//! merges the findings into one cited report.
//!
//! # Architecture
//!
//! ```text
//! query -> Planner -> Dispatcher (N x InvestigationWorker, at most K at once)
//!       -> Synthesizer -> CitationAttributor -> final_report
//! ```
//!
//! - [`planner::Planner`] - One lead-model call producing the sub-tasks
//! - [`dispatcher::Dispatcher`] - Bounded fan-out with per-worker timeouts;
//!   reports come back in submission order
//! - [`worker::InvestigationWorker`] - Search/fetch/reason loop with a tool budget
//! - [`synthesizer::Synthesizer`] - Merges successful reports into one narrative
//! - [`citation::CitationAttributor`] - Inline `[n]` markers and a bibliography
//! - [`events::EventPublisher`] - Ordered progress events, one terminal event
//!
//! # Usage
//!
//! ```ignore
//! use sleuth::research::{ResearchCoordinator, ResearchQuery};
//! use futures::StreamExt;
//!
//! let coordinator = ResearchCoordinator::new(clients, web, config.research.settings());
//! let mut events = coordinator.stream(ResearchQuery::new("How did Rust async evolve?"));
//!
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_sse());
//! }
//! ```
//!
//! # Failure Semantics
//!
//! Planning and synthesis failures end the run with an `error` event. A
//! failed or timed-out worker is recorded in its report and the run goes on
//! unless every worker failed. Citation failures degrade to the unannotated
//! report with an empty bibliography.

/// Claim-to-source attribution and bibliography construction.
pub mod citation;
/// End-to-end run orchestration.
pub mod coordinator;
/// Bounded parallel execution of sub-tasks.
pub mod dispatcher;
/// Progress events and their stream.
pub mod events;
/// Query decomposition.
pub mod planner;
/// Prompt templates.
pub mod prompts;
/// Merging worker reports.
pub mod synthesizer;
/// Run data model and URL normalization.
pub mod types;
/// Per-sub-task investigation loop.
pub mod worker;

pub use citation::{Attribution, CitationAttributor, SourcePool};
pub use coordinator::ResearchCoordinator;
pub use dispatcher::Dispatcher;
pub use events::{EventPublisher, EventStream, ResearchEvent};
pub use planner::{parse_plan, Plan, Planner};
pub use synthesizer::Synthesizer;
pub use types::{
    normalize_url, Bibliography, BibliographyEntry, Citation, FinalReport, PageContent,
    ResearchQuery, ResearchSettings, RunState, SourceHit, SourceLedger, SubTask, WorkerReport,
    WorkerStatus,
};
pub use worker::InvestigationWorker;
