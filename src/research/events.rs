//! Observable event stream of a research run
//!
//! Every stage reports progress through an [`EventPublisher`]. Events are
//! forwarded in production order over an unbounded channel, and exactly one
//! terminal event (`final_report` or `error`) closes the stream.

use crate::research::types::{Bibliography, SourceHit, SubTask, WorkerStatus};
use crate::types::AppError;
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ResearchEvent {
    RunCreated {
        run_id: String,
        query: String,
    },
    LeadThinking {
        text: String,
        ts: DateTime<Utc>,
    },
    LeadAnswer {
        plan_text: String,
        subtasks: Vec<SubTask>,
    },
    WebSearchQuery {
        task_id: String,
        call_id: String,
        query: String,
    },
    WebSearchResults {
        task_id: String,
        call_id: String,
        results: Vec<SourceHit>,
        /// Set when the search failed, as opposed to returning nothing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SubagentCompleted {
        task_id: String,
        status: WorkerStatus,
        sources: usize,
        #[serde(default)]
        truncated: bool,
    },
    FinalReport {
        report_text: String,
        bibliography: Bibliography,
    },
    Error {
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl ResearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ResearchEvent::RunCreated { .. } => "run_created",
            ResearchEvent::LeadThinking { .. } => "lead_thinking",
            ResearchEvent::LeadAnswer { .. } => "lead_answer",
            ResearchEvent::WebSearchQuery { .. } => "web_search_query",
            ResearchEvent::WebSearchResults { .. } => "web_search_results",
            ResearchEvent::SubagentCompleted { .. } => "subagent_completed",
            ResearchEvent::FinalReport { .. } => "final_report",
            ResearchEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchEvent::FinalReport { .. } | ResearchEvent::Error { .. }
        )
    }

    pub fn lead_thinking(text: impl Into<String>) -> Self {
        ResearchEvent::LeadThinking {
            text: text.into(),
            ts: Utc::now(),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let details = match err {
            AppError::WorkerFailed { task_id, .. } | AppError::WorkerTimedOut { task_id, .. } => {
                Some(serde_json::json!({ "task_id": task_id }))
            }
            AppError::AllSubtasksFailed { attempted } => {
                Some(serde_json::json!({ "attempted": attempted }))
            }
            _ => None,
        };
        ResearchEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            details,
        }
    }

    /// Event payload without the tag.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    /// Server-sent-events frame: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.payload())
    }
}

/// Cloneable handle used by every stage to report events.
///
/// After the terminal event the sender is dropped, so later publishes are
/// discarded and the paired [`EventStream`] ends.
#[derive(Clone)]
pub struct EventPublisher {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<ResearchEvent>>>>,
}

impl EventPublisher {
    /// A publisher and the stream that receives its events.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            EventStream::new(rx),
        )
    }

    /// Forward a progress event. Terminal events go through [`Self::finish`].
    pub fn publish(&self, event: ResearchEvent) -> bool {
        if event.is_terminal() {
            return self.finish(event);
        }
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                debug!(event = event.name(), "publishing research event");
                tx.send(event).is_ok()
            }
            None => false,
        }
    }

    /// Emit the terminal event. Only the first call has any effect.
    pub fn finish(&self, event: ResearchEvent) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            Some(tx) => {
                debug!(event = event.name(), "publishing terminal research event");
                tx.send(event).is_ok()
            }
            None => false,
        }
    }
}

/// Ordered stream of a run's events.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = ResearchEvent> + Send>>,
}

impl EventStream {
    fn new(mut rx: mpsc::UnboundedReceiver<ResearchEvent>) -> Self {
        let inner = stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Cancel whatever the guard protects once this stream is dropped.
    pub(crate) fn with_drop_guard(self, guard: DropGuard) -> Self {
        let mut events = self.inner;
        let inner = stream! {
            let _guard = guard;
            while let Some(event) = futures::StreamExt::next(&mut events).await {
                yield event;
            }
        };
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for EventStream {
    type Item = ResearchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_sse_framing() {
        let event = ResearchEvent::RunCreated {
            run_id: "run-1".into(),
            query: "q".into(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: run_created\ndata: "));
        assert!(frame.ends_with("\n\n"));
        let data = frame
            .trim_end()
            .strip_prefix("event: run_created\ndata: ")
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(payload, serde_json::json!({"run_id": "run-1", "query": "q"}));
    }

    #[test]
    fn test_payload_omits_absent_error() {
        let event = ResearchEvent::WebSearchResults {
            task_id: "task-1".into(),
            call_id: "call_0".into(),
            results: vec![],
            error: None,
        };
        let payload = event.payload();
        assert!(payload.get("error").is_none());
        assert_eq!(payload["results"], serde_json::json!([]));
    }

    #[test]
    fn test_error_event_from_app_error() {
        let event = ResearchEvent::from_error(&AppError::AllSubtasksFailed { attempted: 3 });
        assert!(event.is_terminal());
        match event {
            ResearchEvent::Error {
                kind,
                message,
                details,
            } => {
                assert_eq!(kind, "all_subtasks_failed");
                assert_eq!(message, "All 3 sub-tasks failed");
                assert_eq!(details.unwrap()["attempted"], 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_terminal_event_closes_stream() {
        let (publisher, stream) = EventPublisher::channel();
        let other = publisher.clone();

        assert!(publisher.publish(ResearchEvent::lead_thinking("hmm")));
        assert!(other.finish(ResearchEvent::from_error(&AppError::Cancelled)));
        assert!(!publisher.finish(ResearchEvent::FinalReport {
            report_text: "late".into(),
            bibliography: Bibliography::default(),
        }));
        assert!(!publisher.publish(ResearchEvent::lead_thinking("after")));

        let events: Vec<ResearchEvent> = stream.collect().await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["lead_thinking", "error"]);
    }

    #[tokio::test]
    async fn test_publish_routes_terminal_events() {
        let (publisher, stream) = EventPublisher::channel();
        publisher.publish(ResearchEvent::FinalReport {
            report_text: "done".into(),
            bibliography: Bibliography::default(),
        });
        assert!(!publisher.publish(ResearchEvent::lead_thinking("late")));
        assert_eq!(stream.count().await, 1);
    }
}
