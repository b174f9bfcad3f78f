//! Data model of a research run.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Immutable user query plus the run identifier allocated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub run_id: String,
    pub text: String,
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_run_id(uuid::Uuid::new_v4().to_string(), text)
    }

    pub fn with_run_id(run_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            text: text.into(),
        }
    }
}

/// One planned unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub instructions: String,
    pub rationale: String,
}

/// A candidate reference returned by search or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Host the result was served from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl SourceHit {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        let url = url.into();
        let host = host_of(&url);
        Self {
            url,
            title: title.into(),
            snippet: snippet.into(),
            host,
        }
    }

    /// Normalized identity of this source.
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Text of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
}

/// Source list that drops entries whose normalized URL was already seen.
#[derive(Debug, Clone, Default)]
pub struct SourceLedger {
    hits: Vec<SourceHit>,
    keys: HashSet<String>,
}

impl SourceLedger {
    /// Returns false if the source was a duplicate.
    pub fn push(&mut self, hit: SourceHit) -> bool {
        if self.keys.insert(hit.key()) {
            self.hits.push(hit);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceHit> {
        self.hits.iter()
    }

    pub fn into_vec(self) -> Vec<SourceHit> {
        self.hits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Ok,
    Failed,
    TimedOut,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Ok => "ok",
            WorkerStatus::Failed => "failed",
            WorkerStatus::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one investigation worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub task_id: String,
    pub narrative: String,
    pub sources_used: Vec<SourceHit>,
    pub status: WorkerStatus,
    /// The worker ran out of tool budget before answering.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerReport {
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            narrative: String::new(),
            sources_used: Vec::new(),
            status: WorkerStatus::Failed,
            truncated: false,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == WorkerStatus::Ok
    }
}

/// One inline marker placed in the final text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub ordinal: usize,
    pub source_key: String,
    /// Byte range of the cited sentence in the annotated report.
    pub span_hint: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub ordinal: usize,
    pub url: String,
    pub title: String,
}

/// Ordinal to source mapping, ordered by ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bibliography {
    pub entries: Vec<BibliographyEntry>,
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[\s*(\d+(?:\s*,\s*\d+)*)\s*\]").unwrap())
}

impl Bibliography {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, ordinal: usize) -> Option<&BibliographyEntry> {
        self.entries.iter().find(|e| e.ordinal == ordinal)
    }

    /// Rewrite `[n]` and `[n, m]` markers as markdown links labelled by host.
    ///
    /// Markers whose ordinals are all unknown are left untouched.
    pub fn render_links(&self, text: &str) -> String {
        if self.entries.is_empty() {
            return text.to_string();
        }
        marker_regex()
            .replace_all(text, |caps: &Captures| {
                let ordinals: Vec<&str> = caps[1].split(',').map(str::trim).collect();
                let links: Vec<Option<String>> = ordinals
                    .iter()
                    .map(|n| {
                        let entry = n.parse().ok().and_then(|n| self.get(n))?;
                        Some(format!("[{}]({})", host_label(&entry.url), entry.url))
                    })
                    .collect();
                if links.iter().all(Option::is_none) {
                    return caps[0].to_string();
                }
                ordinals
                    .iter()
                    .zip(links)
                    .map(|(n, link)| link.unwrap_or_else(|| format!("[{}]", n)))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .into_owned()
    }
}

/// Runtime limits for one research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSettings {
    pub max_subtasks: usize,
    pub concurrency: usize,
    pub worker_timeout: Duration,
    pub max_tool_calls: usize,
    pub search_results: usize,
    pub max_page_chars: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_subtasks: 5,
            concurrency: 3,
            worker_timeout: Duration::from_secs(180),
            max_tool_calls: 8,
            search_results: 5,
            max_page_chars: 8000,
        }
    }
}

/// Successful outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub report_text: String,
    pub bibliography: Bibliography,
    pub citations: Vec<Citation>,
}

/// Aggregate state of a run, discarded after the terminal event.
#[derive(Debug, Clone)]
pub struct RunState {
    pub query: ResearchQuery,
    pub plan: Vec<SubTask>,
    /// Worker reports in submission order
    pub reports: Vec<WorkerReport>,
    pub bibliography: Bibliography,
}

impl RunState {
    pub fn new(query: ResearchQuery) -> Self {
        Self {
            query,
            plan: Vec::new(),
            reports: Vec::new(),
            bibliography: Bibliography::default(),
        }
    }

    pub fn successful_reports(&self) -> Vec<&WorkerReport> {
        self.reports.iter().filter(|r| r.is_ok()).collect()
    }
}

/// Normalized identity of a URL: scheme, host and path, lowercased, with the
/// query, fragment and trailing slash removed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let key = match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default();
            let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
            format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
        }
        _ => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    key.to_lowercase().trim_end_matches('/').to_string()
}

/// Host of a URL with any leading `www.` removed.
pub fn host_of(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

fn host_label(raw: &str) -> String {
    host_of(raw).unwrap_or_else(|| raw.to_string())
}
