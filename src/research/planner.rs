use crate::llm::{ConversationMessage, LLMClient};
use crate::research::events::{EventPublisher, ResearchEvent};
use crate::research::prompts;
use crate::research::types::{ResearchQuery, SubTask};
use crate::types::{AppError, Result};
use crate::utils::toml_config::MAX_SUBTASKS_CAP;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The lead's decomposition of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub approach: String,
    pub subtasks: Vec<SubTask>,
}

impl Plan {
    /// Human-readable plan, as published in `lead_answer`.
    pub fn render(&self) -> String {
        let mut text = String::new();
        if !self.approach.is_empty() {
            text.push_str(self.approach.trim());
            text.push_str("\n\n");
        }
        for (i, task) in self.subtasks.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, task.instructions));
        }
        text.trim_end().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    approach: String,
    #[serde(default)]
    subtasks: Vec<RawSubTask>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSubTask {
    Detailed {
        instructions: String,
        #[serde(default)]
        rationale: String,
    },
    Plain(String),
}

/// Decomposes a query into independent sub-tasks with one model call.
pub struct Planner {
    llm: Arc<dyn LLMClient>,
    max_subtasks: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LLMClient>, max_subtasks: usize) -> Self {
        Self {
            llm,
            max_subtasks: max_subtasks.clamp(1, MAX_SUBTASKS_CAP),
        }
    }

    pub async fn plan(
        &self,
        query: &ResearchQuery,
        events: &EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<Plan> {
        let messages = vec![
            ConversationMessage::system(prompts::planner_system(&Utc::now(), self.max_subtasks)),
            ConversationMessage::user(prompts::planner_user(&query.text)),
        ];

        let response = match self.llm.complete(&messages, &[], cancel).await {
            Ok(response) => response,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => return Err(AppError::PlanningFailed(e.to_string())),
        };

        if let Some(thinking) = &response.thinking {
            events.publish(ResearchEvent::lead_thinking(thinking.clone()));
        }

        let plan = parse_plan(&response.content, self.max_subtasks);
        if plan.subtasks.is_empty() {
            warn!(
                content_len = response.content.len(),
                "planner returned no usable sub-tasks"
            );
            return Err(AppError::PlanningFailed(
                "the model returned no usable sub-tasks".to_string(),
            ));
        }

        info!(subtasks = plan.subtasks.len(), "research plan ready");
        Ok(plan)
    }
}

/// Parse the planner's reply, accepting JSON or a numbered list.
pub fn parse_plan(content: &str, max_subtasks: usize) -> Plan {
    let (approach, raw): (String, Vec<(String, String)>) =
        match extract_json(content).and_then(|v| serde_json::from_value::<RawPlan>(v).ok()) {
            Some(plan) => (
                plan.approach,
                plan.subtasks
                    .into_iter()
                    .map(|t| match t {
                        RawSubTask::Detailed {
                            instructions,
                            rationale,
                        } => (instructions, rationale),
                        RawSubTask::Plain(instructions) => (instructions, String::new()),
                    })
                    .collect(),
            ),
            None => {
                debug!("planner reply is not JSON, falling back to list parsing");
                (String::new(), parse_list(content))
            }
        };

    let mut seen = HashSet::new();
    let subtasks = raw
        .into_iter()
        .map(|(instructions, rationale)| (instructions.trim().to_string(), rationale.trim().to_string()))
        .filter(|(instructions, _)| !instructions.is_empty())
        .filter(|(instructions, _)| seen.insert(dedup_key(instructions)))
        .take(max_subtasks)
        .enumerate()
        .map(|(i, (instructions, rationale))| SubTask {
            id: format!("task-{}", i + 1),
            instructions,
            rationale,
        })
        .collect();

    Plan {
        approach: approach.trim().to_string(),
        subtasks,
    }
}

fn list_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^\s*(\d+[.)]|[-*])\s+").unwrap())
}

/// Items of a numbered or bulleted list. Lines without a marker followed by
/// whitespace ("2024 was a hard year") are prose and ignored.
fn parse_list(content: &str) -> Vec<(String, String)> {
    let marker = list_marker();
    content
        .lines()
        .filter_map(|line| {
            let found = marker.find(line)?;
            Some((line[found.end()..].trim().to_string(), String::new()))
        })
        .collect()
}

fn dedup_key(instructions: &str) -> String {
    instructions
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pull the first JSON object out of a model reply, tolerating code fences
/// and surrounding prose.
pub(crate) fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}
