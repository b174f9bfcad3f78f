use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

// ============= Tool Types =============

/// Schema of a capability offered to the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A capability invocation requested by the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

// ============= Error Types =============

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    /// The planner could not produce a single usable sub-task.
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Worker '{task_id}' failed: {message}")]
    WorkerFailed { task_id: String, message: String },

    #[error("Worker '{task_id}' timed out after {seconds}s")]
    WorkerTimedOut { task_id: String, seconds: u64 },

    #[error("All {attempted} sub-tasks failed")]
    AllSubtasksFailed { attempted: usize },

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Citation attribution failed: {0}")]
    AttributionFailed(String),

    /// A gateway or capability call failed on the wire.
    ///
    /// `retryable` is decided once, where the underlying HTTP error is still
    /// available, and never re-derived from the message.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("Research run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable wire name used in `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PlanningFailed(_) => "planning_failed",
            AppError::WorkerFailed { .. } => "worker_failed",
            AppError::WorkerTimedOut { .. } => "worker_timed_out",
            AppError::AllSubtasksFailed { .. } => "all_subtasks_failed",
            AppError::SynthesisFailed(_) => "synthesis_failed",
            AppError::AttributionFailed(_) => "attribution_failed",
            AppError::Transport { .. } => "transport_failed",
            AppError::Cancelled => "cancelled",
            AppError::Configuration(_) => "configuration",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal(_) => "internal",
        }
    }

    /// A transport failure that will not go away on its own.
    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// A transport failure worth another attempt.
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Build a transport error from an SDK or HTTP failure.
    ///
    /// Walks the source chain for the `reqwest::Error` underneath and marks
    /// the failure retryable for timeouts, refused or dropped connections,
    /// HTTP 429 and 5xx. Anything else, including errors whose status the
    /// SDK already consumed, is permanent.
    pub fn from_http_failure(context: &str, err: &(dyn StdError + 'static)) -> Self {
        let mut message = format!("{}: {}", context, err);
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }

        AppError::Transport {
            message,
            retryable: is_transient_failure(err),
        }
    }

    /// Whether a transport failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport { retryable: true, .. })
    }
}

/// True when the first `reqwest::Error` in `err`'s source chain is transient.
pub fn is_transient_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            return is_transient_http(http);
        }
        current = e.source();
    }
    false
}

fn is_transient_http(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status().is_some_and(|status| {
        status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    })
}

pub type Result<T> = std::result::Result<T, AppError>;
