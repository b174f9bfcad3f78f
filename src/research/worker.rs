//! Investigation worker
//!
//! One worker runs a bounded search/fetch/reason loop for a single sub-task:
//!
//! ```text
//! Reasoning --tool calls--> Acting --results--> Reasoning --answer--> Done
//! ```
//!
//! Every model and capability call is raced against the run's cancellation
//! token and the worker's own deadline, so a timed-out worker still reports
//! the sources it had gathered.

use crate::llm::{ConversationMessage, LLMClient};
use crate::research::events::{EventPublisher, ResearchEvent};
use crate::research::prompts;
use crate::research::types::{ResearchSettings, SourceHit, SourceLedger, SubTask, WorkerReport, WorkerStatus};
use crate::tools::registry::{capability_definitions, RequestedAction};
use crate::tools::search::WebCapabilities;
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use chrono::Utc;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SNIPPET_CHARS: usize = 200;

/// Why a blocking call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    TimedOut,
}

#[derive(Debug)]
enum Finish {
    Answered(String),
    BudgetExhausted,
    TimedOut,
    Failed(String),
}

#[derive(Debug)]
enum WorkerState {
    Reasoning,
    Acting(Vec<ToolCall>),
    Done(Finish),
}

/// Executes sub-tasks against a worker model and the web capabilities.
#[derive(Clone)]
pub struct InvestigationWorker {
    llm: Arc<dyn LLMClient>,
    web: Arc<dyn WebCapabilities>,
    events: EventPublisher,
    settings: ResearchSettings,
}

/// Mutable state of one investigation.
struct Investigation<'a> {
    task: &'a SubTask,
    deadline: Instant,
    cancel: &'a CancellationToken,
    messages: Vec<ConversationMessage>,
    ledger: SourceLedger,
    notes: Vec<String>,
    calls_used: usize,
}

impl InvestigationWorker {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        web: Arc<dyn WebCapabilities>,
        events: EventPublisher,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            llm,
            web,
            events,
            settings,
        }
    }

    /// Investigate one sub-task until it answers, exhausts its budget, hits
    /// `deadline` or fails.
    ///
    /// Returns `Err(AppError::Cancelled)` only when the run is cancelled; every
    /// other outcome is a [`WorkerReport`].
    pub async fn investigate(
        &self,
        task: &SubTask,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<WorkerReport> {
        let budget = self.settings.max_tool_calls.max(1);
        let mut run = Investigation {
            task,
            deadline,
            cancel,
            messages: vec![
                ConversationMessage::system(prompts::worker_system(&Utc::now(), budget)),
                ConversationMessage::user(prompts::worker_user(task)),
            ],
            ledger: SourceLedger::default(),
            notes: Vec::new(),
            calls_used: 0,
        };
        let tools = capability_definitions();

        let mut state = WorkerState::Reasoning;
        let finish = loop {
            state = match state {
                WorkerState::Reasoning => self.reason(&mut run, &tools, budget).await?,
                WorkerState::Acting(calls) => match self.act(&mut run, calls, budget).await {
                    Ok(next) => next,
                    Err(Interrupt::Cancelled) => return Err(AppError::Cancelled),
                    Err(Interrupt::TimedOut) => WorkerState::Done(Finish::TimedOut),
                },
                WorkerState::Done(finish) => break finish,
            };
        };

        Ok(run.into_report(finish, self.settings.worker_timeout.as_secs()))
    }

    async fn reason(
        &self,
        run: &mut Investigation<'_>,
        tools: &[ToolDefinition],
        budget: usize,
    ) -> Result<WorkerState> {
        let response = match guarded(
            run.deadline,
            run.cancel,
            self.llm.complete(&run.messages, tools, run.cancel),
        )
        .await
        {
            Err(Interrupt::Cancelled) | Ok(Err(AppError::Cancelled)) => {
                return Err(AppError::Cancelled)
            }
            Err(Interrupt::TimedOut) => return Ok(WorkerState::Done(Finish::TimedOut)),
            Ok(Err(e)) => return Ok(WorkerState::Done(Finish::Failed(e.to_string()))),
            Ok(Ok(response)) => response,
        };

        if response.is_terminal() {
            return Ok(WorkerState::Done(Finish::Answered(response.content)));
        }
        run.note(&response.content);
        if run.calls_used >= budget {
            return Ok(WorkerState::Done(Finish::BudgetExhausted));
        }
        run.messages.push(ConversationMessage::assistant(
            response.content,
            response.tool_calls.clone(),
        ));
        Ok(WorkerState::Acting(response.tool_calls))
    }

    /// Perform the requested tool calls in order.
    async fn act(
        &self,
        run: &mut Investigation<'_>,
        calls: Vec<ToolCall>,
        budget: usize,
    ) -> std::result::Result<WorkerState, Interrupt> {
        for call in calls {
            if run.calls_used >= budget {
                debug!(task_id = %run.task.id, "tool budget exhausted mid-batch");
                return Ok(WorkerState::Done(Finish::BudgetExhausted));
            }
            run.calls_used += 1;

            let result = match RequestedAction::try_from(&call) {
                Ok(RequestedAction::Search { query, max_results }) => {
                    self.search(run, &call, &query, max_results).await?
                }
                Ok(RequestedAction::Fetch { urls }) => self.fetch(run, &urls).await?,
                Err(e) => {
                    warn!(task_id = %run.task.id, tool = %call.name, error = %e, "rejected tool call");
                    json!({ "error": e.to_string() })
                }
            };
            run.messages
                .push(ConversationMessage::tool_result(&call, &result));
        }
        Ok(WorkerState::Reasoning)
    }

    async fn search(
        &self,
        run: &mut Investigation<'_>,
        call: &ToolCall,
        query: &str,
        max_results: Option<usize>,
    ) -> std::result::Result<Value, Interrupt> {
        let limit = self.settings.search_results.max(1);
        let max_results = max_results.unwrap_or(limit).clamp(1, limit);
        self.events.publish(ResearchEvent::WebSearchQuery {
            task_id: run.task.id.clone(),
            call_id: call.id.clone(),
            query: query.to_string(),
        });
        debug!(task_id = %run.task.id, query, "web search");

        match guarded(
            run.deadline,
            run.cancel,
            self.web.search(query, max_results, run.cancel),
        )
        .await?
        {
            Ok(hits) => {
                self.events.publish(ResearchEvent::WebSearchResults {
                    task_id: run.task.id.clone(),
                    call_id: call.id.clone(),
                    results: hits.clone(),
                    error: None,
                });
                let results: Vec<Value> = hits
                    .iter()
                    .map(|h| json!({"title": h.title, "url": h.url, "snippet": h.snippet}))
                    .collect();
                for hit in hits {
                    run.ledger.push(hit);
                }
                Ok(json!({ "query": query, "results": results, "count": results.len() }))
            }
            Err(AppError::Cancelled) => Err(Interrupt::Cancelled),
            Err(e) => {
                warn!(task_id = %run.task.id, query, error = %e, "web search failed");
                self.events.publish(ResearchEvent::WebSearchResults {
                    task_id: run.task.id.clone(),
                    call_id: call.id.clone(),
                    results: Vec::new(),
                    error: Some(e.to_string()),
                });
                Ok(json!({ "query": query, "error": e.to_string() }))
            }
        }
    }

    async fn fetch(
        &self,
        run: &mut Investigation<'_>,
        urls: &[String],
    ) -> std::result::Result<Value, Interrupt> {
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            debug!(task_id = %run.task.id, url = %url, "web fetch");
            match guarded(run.deadline, run.cancel, self.web.fetch(url, run.cancel)).await? {
                Ok(page) => {
                    let hit = SourceHit::new(
                        if page.url.is_empty() { url.clone() } else { page.url.clone() },
                        page.title.clone().unwrap_or_default(),
                        truncate_chars(page.text.trim(), SNIPPET_CHARS),
                    );
                    let title = if hit.title.is_empty() {
                        hit.host.clone().unwrap_or_default()
                    } else {
                        hit.title.clone()
                    };
                    run.ledger.push(SourceHit { title: title.clone(), ..hit });
                    pages.push(json!({
                        "url": url,
                        "title": title,
                        "content": truncate_chars(&page.text, self.settings.max_page_chars),
                    }));
                }
                Err(AppError::Cancelled) => return Err(Interrupt::Cancelled),
                Err(e) => {
                    warn!(task_id = %run.task.id, url = %url, error = %e, "web fetch failed");
                    pages.push(json!({ "url": url, "error": e.to_string() }));
                }
            }
        }
        Ok(json!({ "pages": pages }))
    }
}

impl Investigation<'_> {
    fn note(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.notes.push(text.to_string());
        }
    }

    /// Whatever the worker wrote so far, or a digest of its sources.
    fn partial_narrative(&self) -> String {
        if !self.notes.is_empty() {
            return self.notes.join("\n\n");
        }
        self.ledger
            .iter()
            .filter(|h| !h.snippet.is_empty())
            .map(|h| format!("- {}: {}", h.title, h.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn into_report(self, finish: Finish, timeout_secs: u64) -> WorkerReport {
        // An empty answer with nothing gathered is not a finding.
        let finish = match finish {
            Finish::Answered(answer)
                if answer.trim().is_empty() && self.partial_narrative().is_empty() =>
            {
                Finish::Failed("model returned an empty answer".to_string())
            }
            other => other,
        };

        let (narrative, status, truncated, error) = match finish {
            Finish::Answered(answer) if !answer.trim().is_empty() => {
                (answer.trim().to_string(), WorkerStatus::Ok, false, None)
            }
            Finish::Answered(_) => (self.partial_narrative(), WorkerStatus::Ok, false, None),
            Finish::BudgetExhausted => (self.partial_narrative(), WorkerStatus::Ok, true, None),
            Finish::TimedOut => (
                self.partial_narrative(),
                WorkerStatus::TimedOut,
                false,
                Some(
                    AppError::WorkerTimedOut {
                        task_id: self.task.id.clone(),
                        seconds: timeout_secs,
                    }
                    .to_string(),
                ),
            ),
            Finish::Failed(message) => (
                self.partial_narrative(),
                WorkerStatus::Failed,
                false,
                Some(
                    AppError::WorkerFailed {
                        task_id: self.task.id.clone(),
                        message,
                    }
                    .to_string(),
                ),
            ),
        };

        info!(
            task_id = %self.task.id,
            status = %status,
            truncated,
            tool_calls = self.calls_used,
            sources = self.ledger.len(),
            "worker finished"
        );

        WorkerReport {
            task_id: self.task.id.clone(),
            narrative,
            sources_used: self.ledger.into_vec(),
            status,
            truncated,
            error,
        }
    }
}

/// Race `fut` against cancellation and the worker deadline.
async fn guarded<T, F>(
    deadline: Instant,
    cancel: &CancellationToken,
    fut: F,
) -> std::result::Result<T, Interrupt>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(Interrupt::TimedOut),
        value = fut => Ok(value),
    }
}

/// First `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMResponse;
    use crate::research::types::PageContent;
    use crate::tools::search::MockWebCapabilities;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses in order; repeats the last one when exhausted.
    struct Scripted {
        responses: Mutex<Vec<LLMResponse>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(mut responses: Vec<LLMResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl LLMClient for Scripted {
        async fn complete(
            &self,
            _messages: &[ConversationMessage],
            _tools: &[ToolDefinition],
            _cancel: &CancellationToken,
        ) -> Result<LLMResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.pop().unwrap())
            } else {
                Ok(responses.last().cloned().unwrap())
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn task() -> SubTask {
        SubTask {
            id: "task-1".to_string(),
            instructions: "Find the tokio release history".to_string(),
            rationale: String::new(),
        }
    }

    fn web_with_results() -> MockWebCapabilities {
        let mut web = MockWebCapabilities::new();
        web.expect_search().returning(|_, _, _| {
            Ok(vec![
                SourceHit::new("https://tokio.rs/blog/", "Tokio blog", "Release notes"),
                SourceHit::new("https://tokio.rs/blog?page=2", "Tokio blog p2", "More"),
                SourceHit::new("https://docs.rs/tokio", "docs.rs", "API docs"),
            ])
        });
        web.expect_fetch().returning(|url, _| {
            Ok(PageContent {
                url: url.to_string(),
                title: None,
                text: "Tokio 1.0 was released in December 2020.".to_string(),
            })
        });
        web
    }

    fn worker(llm: Scripted, web: MockWebCapabilities, events: EventPublisher, budget: usize) -> InvestigationWorker {
        InvestigationWorker::new(
            Arc::new(llm),
            Arc::new(web),
            events,
            ResearchSettings {
                max_tool_calls: budget,
                worker_timeout: Duration::from_secs(60),
                ..ResearchSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_search_fetch_answer() {
        let llm = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![call("c1", "web_search", json!({"query": "tokio releases"}))]),
            LLMResponse::with_tool_calls("", vec![call("c2", "web_fetch", json!({"urls": ["https://github.com/tokio-rs/tokio/releases"]}))]),
            LLMResponse::text("Tokio 1.0 shipped in December 2020."),
        ]);
        let (events, stream) = EventPublisher::channel();
        let worker = worker(llm, web_with_results(), events.clone(), 8);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        drop(worker);
        drop(events);

        assert_eq!(report.status, WorkerStatus::Ok);
        assert!(!report.truncated);
        assert_eq!(report.narrative, "Tokio 1.0 shipped in December 2020.");
        // tokio.rs/blog/ and tokio.rs/blog?page=2 collapse to one source
        let urls: Vec<&str> = report.sources_used.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://tokio.rs/blog/",
                "https://docs.rs/tokio",
                "https://github.com/tokio-rs/tokio/releases"
            ]
        );
        assert_eq!(report.sources_used[2].title, "github.com");

        let names: Vec<&'static str> = stream.map(|e| e.name()).collect().await;
        assert_eq!(names, vec!["web_search_query", "web_search_results"]);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_truncates() {
        let llm = Scripted::new(vec![LLMResponse::with_tool_calls(
            "Still looking.",
            vec![call("c", "web_search", json!({"query": "more"}))],
        )]);
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, web_with_results(), events, 2);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, WorkerStatus::Ok);
        assert!(report.truncated);
        assert!(report.narrative.starts_with("Still looking."));
        assert_eq!(report.sources_used.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_without_findings_fails() {
        let llm = Scripted::new(vec![LLMResponse::text("  \n")]);
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, MockWebCapabilities::new(), events, 4);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, WorkerStatus::Failed);
        assert!(report.narrative.is_empty());
        assert!(report.error.as_deref().unwrap().contains("empty answer"));
    }

    #[tokio::test]
    async fn test_empty_answer_keeps_gathered_sources() {
        let llm = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![call("c1", "web_search", json!({"query": "tokio"}))]),
            LLMResponse::text(""),
        ]);
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, web_with_results(), events, 4);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, WorkerStatus::Ok);
        assert!(report.narrative.contains("Tokio blog: Release notes"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let llm = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![call("c1", "calculator", json!({}))]),
            LLMResponse::text("Answer without sources."),
        ]);
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, MockWebCapabilities::new(), events, 4);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, WorkerStatus::Ok);
        assert!(report.sources_used.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_distinct_from_empty() {
        let llm = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![call("c1", "web_search", json!({"query": "x"}))]),
            LLMResponse::text("Nothing found."),
        ]);
        let mut web = MockWebCapabilities::new();
        web.expect_search()
            .returning(|_, _, _| Err(AppError::transient("Search failed: 503")));
        let (events, stream) = EventPublisher::channel();
        let worker = worker(llm, web, events.clone(), 4);

        worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        drop(worker);
        drop(events);

        let published: Vec<ResearchEvent> = stream.collect().await;
        assert!(matches!(
            &published[1],
            ResearchEvent::WebSearchResults { error: Some(e), results, .. } if e.contains("503") && results.is_empty()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_partial_sources() {
        let mut llm = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![call("c1", "web_search", json!({"query": "q"}))]),
            LLMResponse::text("never delivered"),
        ]);
        llm.delay = Some(Duration::from_secs(20));
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, web_with_results(), events, 4);

        let report = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.status, WorkerStatus::TimedOut);
        assert_eq!(report.sources_used.len(), 2);
        assert!(report.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_worker_produces_no_report() {
        let llm = Scripted::new(vec![LLMResponse::text("x")]);
        let (events, _stream) = EventPublisher::channel();
        let worker = worker(llm, MockWebCapabilities::new(), events, 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = worker
            .investigate(&task(), Instant::now() + Duration::from_secs(60), &cancel)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
