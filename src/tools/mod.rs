//! Capabilities offered to investigation workers
//!
//! # Module Structure
//!
//! - [`registry`](crate::tools::registry) - The closed capability set, its tool
//!   schemas and parsing of model tool calls into [`RequestedAction`]s
//! - [`search`](crate::tools::search) - The [`WebCapabilities`] interface and
//!   its daedra (DuckDuckGo) backend
//!
//! ```ignore
//! let tools = capability_definitions(); // web_search, web_fetch
//! match RequestedAction::try_from(&call)? {
//!     RequestedAction::Search { query, .. } => web.search(&query, 5, &cancel).await?,
//!     RequestedAction::Fetch { urls } => { /* ... */ }
//! }
//! ```

/// Capability schemas and requested-action parsing.
pub mod registry;
/// Web search and page fetch interface.
pub mod search;

pub use registry::{capability_definitions, Capability, RequestedAction};
#[cfg(feature = "daedra")]
pub use search::DaedraCapabilities;
pub use search::WebCapabilities;
