//! Mock implementations for testing.
//!
//! [`ScriptedLLM`] plays every role of a research run (lead, worker,
//! citation) and decides what to answer from the system prompt it receives.
//! [`StaticWeb`] serves canned search results keyed by query.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sleuth::llm::{ConversationMessage, LLMClient, LLMResponse, MessageRole, ResearchClients};
use sleuth::research::{PageContent, SourceHit};
use sleuth::types::{AppError, Result, ToolCall, ToolDefinition};
use sleuth::WebCapabilities;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which pipeline stage a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Worker,
    Synthesis,
    Citation,
}

pub fn stage_of(messages: &[ConversationMessage]) -> Stage {
    let system = messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    if system.contains("Break the user's question") {
        Stage::Plan
    } else if system.contains("working on one sub-topic") {
        Stage::Worker
    } else if system.contains("writing the final report") {
        Stage::Synthesis
    } else {
        Stage::Citation
    }
}

/// Instructions of the sub-task a worker request is about.
pub fn task_of(messages: &[ConversationMessage]) -> String {
    messages
        .get(1)
        .map(|m| m.content.trim_start_matches("Task:\n"))
        .and_then(|c| c.lines().next())
        .unwrap_or_default()
        .to_string()
}

/// Deterministic stand-in for every model of a run.
///
/// Workers search once for their task instructions, then answer
/// "Findings about <task>.".
pub struct ScriptedLLM {
    plan: Result<String>,
    synthesis: Result<String>,
    citations: Result<String>,
    slow: HashMap<String, Duration>,
    failing: HashSet<String>,
    /// User prompts the synthesizer received
    pub synthesis_prompts: Mutex<Vec<String>>,
    /// Workers that returned their final answer
    pub worker_answers: AtomicUsize,
}

impl ScriptedLLM {
    pub fn new(plan: &str) -> Self {
        Self {
            plan: Ok(plan.to_string()),
            synthesis: Ok("Unified findings.".to_string()),
            citations: Ok(r#"{"claims": []}"#.to_string()),
            slow: HashMap::new(),
            failing: HashSet::new(),
            synthesis_prompts: Mutex::new(Vec::new()),
            worker_answers: AtomicUsize::new(0),
        }
    }

    /// Planner reply listing `tasks` as plain sub-task strings.
    pub fn planning(tasks: &[&str]) -> Self {
        Self::new(&json!({ "approach": "Split the question.", "subtasks": tasks }).to_string())
    }

    pub fn synthesis(mut self, text: &str) -> Self {
        self.synthesis = Ok(text.to_string());
        self
    }

    pub fn citations(mut self, reply: &str) -> Self {
        self.citations = Ok(reply.to_string());
        self
    }

    pub fn failing_plan(mut self, error: AppError) -> Self {
        self.plan = Err(error);
        self
    }

    pub fn failing_synthesis(mut self, error: AppError) -> Self {
        self.synthesis = Err(error);
        self
    }

    pub fn failing_citations(mut self, error: AppError) -> Self {
        self.citations = Err(error);
        self
    }

    /// Every model call of this task's worker takes `delay`.
    pub fn slow_task(mut self, task: &str, delay: Duration) -> Self {
        self.slow.insert(task.to_string(), delay);
        self
    }

    /// This task's worker gets a gateway error.
    pub fn failing_task(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }

    pub fn into_clients(self) -> (Arc<Self>, ResearchClients) {
        let llm = Arc::new(self);
        let clients = ResearchClients {
            lead: llm.clone(),
            worker: llm.clone(),
            citation: llm.clone(),
        };
        (llm, clients)
    }

    async fn work(&self, messages: &[ConversationMessage]) -> Result<LLMResponse> {
        let task = task_of(messages);
        if let Some(delay) = self.slow.get(&task) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&task) {
            return Err(AppError::transport("Ollama error: model crashed"));
        }

        let searched = messages.iter().any(|m| m.role == MessageRole::Tool);
        if !searched {
            return Ok(LLMResponse::with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_0".to_string(),
                    name: "web_search".to_string(),
                    arguments: json!({ "query": task }),
                }],
            ));
        }
        self.worker_answers.fetch_add(1, Ordering::SeqCst);
        Ok(LLMResponse::text(format!("Findings about {}.", task)))
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        _tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> Result<LLMResponse> {
        match stage_of(messages) {
            Stage::Plan => self.plan.clone().map(LLMResponse::text),
            Stage::Worker => self.work(messages).await,
            Stage::Synthesis => {
                if let Some(prompt) = messages.get(1) {
                    self.synthesis_prompts
                        .lock()
                        .unwrap()
                        .push(prompt.content.clone());
                }
                self.synthesis.clone().map(LLMResponse::text)
            }
            Stage::Citation => self.citations.clone().map(LLMResponse::text),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Canned web search keyed by exact query.
#[derive(Default)]
pub struct StaticWeb {
    results: HashMap<String, Vec<SourceHit>>,
    failing: HashSet<String>,
    pub searches: AtomicUsize,
}

impl StaticWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, urls: &[&str]) -> Self {
        let hits = urls
            .iter()
            .enumerate()
            .map(|(i, url)| SourceHit::new(*url, format!("{} result {}", query, i + 1), "snippet"))
            .collect();
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn failing_query(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl WebCapabilities for StaticWeb {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SourceHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(query) {
            return Err(AppError::transient("Search failed: 503"));
        }
        Ok(self
            .results
            .get(query)
            .map(|hits| hits.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch(&self, url: &str, _cancel: &CancellationToken) -> Result<PageContent> {
        Ok(PageContent {
            url: url.to_string(),
            title: Some("Fetched page".to_string()),
            text: format!("Contents of {}", url),
        })
    }
}
