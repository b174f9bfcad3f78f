//! Citation attribution
//!
//! The unified report is split into sentences deterministically, the citation
//! model maps sentence numbers to source ids, and this module turns that map
//! into inline `[n]` markers and a bibliography. Ordinals follow first
//! appearance in the final text, so identical inputs always produce identical
//! numbering and placement.

use crate::llm::{ConversationMessage, LLMClient};
use crate::research::planner::extract_json;
use crate::research::prompts;
use crate::research::types::{
    normalize_url, Bibliography, BibliographyEntry, Citation, SourceHit, SubTask, WorkerReport,
};
use crate::types::{AppError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Annotated report plus the sources it cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub report_text: String,
    pub bibliography: Bibliography,
    pub citations: Vec<Citation>,
}

impl Attribution {
    /// The report as synthesized, with no markers and an empty bibliography.
    pub fn unannotated(report_text: impl Into<String>) -> Self {
        Self {
            report_text: report_text.into(),
            bibliography: Bibliography::default(),
            citations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct PooledSource {
    hit: SourceHit,
    key: String,
    /// Sub-tasks whose workers consulted this source.
    owners: Vec<String>,
}

/// Every distinct source consulted by successful workers, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct SourcePool {
    sources: Vec<PooledSource>,
    by_key: HashMap<String, usize>,
}

impl SourcePool {
    pub fn from_reports(reports: &[&WorkerReport]) -> Self {
        let mut pool = Self::default();
        for report in reports {
            for hit in &report.sources_used {
                pool.add(hit, &report.task_id);
            }
        }
        pool
    }

    fn add(&mut self, hit: &SourceHit, owner: &str) {
        let key = hit.key();
        match self.by_key.get(&key) {
            Some(&idx) => {
                let source = &mut self.sources[idx];
                if !source.owners.iter().any(|o| o == owner) {
                    source.owners.push(owner.to_string());
                }
            }
            None => {
                self.by_key.insert(key.clone(), self.sources.len());
                self.sources.push(PooledSource {
                    hit: hit.clone(),
                    key,
                    owners: vec![owner.to_string()],
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn hits(&self) -> Vec<&SourceHit> {
        self.sources.iter().map(|s| &s.hit).collect()
    }

    /// Resolve a model reference: `"S3"`, `3`, `"3"` or a URL.
    fn resolve(&self, reference: &Value) -> Option<usize> {
        let ordinal = match reference {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => {
                let s = s.trim().trim_start_matches('[').trim_end_matches(']');
                let digits = s.strip_prefix(['S', 's']).unwrap_or(s);
                match digits.parse::<usize>() {
                    Ok(n) => Some(n),
                    Err(_) => return self.by_key.get(&normalize_url(s)).copied(),
                }
            }
            _ => None,
        }?;
        (1..=self.sources.len()).contains(&ordinal).then(|| ordinal - 1)
    }
}

/// Byte range of one sentence in the unified report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

/// Split a Markdown report into attributable sentences.
///
/// Headings, table rows and fenced code are skipped; list and quote markers
/// are not part of the sentence.
pub(crate) fn split_sentences(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    let mut push = |start: usize, end: usize| {
        if end > start && text[start..end].chars().any(char::is_alphanumeric) {
            spans.push(Span { start, end });
        }
    };

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('|') {
            continue;
        }

        let body = line.trim_end();
        let bytes = body.as_bytes();
        let mut i = leading_marker_len(body);
        let mut start = line_start + i;
        while i < bytes.len() {
            if !matches!(bytes[i], b'.' | b'!' | b'?') {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < bytes.len() && matches!(bytes[j], b'.' | b'!' | b'?' | b'"' | b'\'' | b')') {
                j += 1;
            }
            let abbreviated = j == i + 1 && bytes[i] == b'.' && is_abbreviation(body, i);
            if (j == bytes.len() || bytes[j].is_ascii_whitespace()) && !abbreviated {
                push(start, line_start + j);
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                start = line_start + j;
            }
            i = j;
        }
        push(start, line_start + bytes.len());
    }
    spans
}

const ABBREVIATIONS: &[&str] = &[
    "al", "approx", "cf", "co", "dr", "etc", "fig", "inc", "jr", "ltd", "mr", "mrs", "ms", "no",
    "prof", "sr", "st", "vs",
];

/// Whether the period at byte `dot` closes an abbreviation rather than a
/// sentence: a single letter, a dotted initialism ("U.S.", "e.g.") or a
/// known short form ("Dr.", "etc.").
fn is_abbreviation(body: &str, dot: usize) -> bool {
    let word_start = body[..dot]
        .rfind(|c: char| c.is_whitespace() || matches!(c, '(' | '"' | '\''))
        .map_or(0, |p| p + 1);
    let word = &body[word_start..dot];
    if word.is_empty() {
        return false;
    }
    if word
        .split('.')
        .all(|part| part.chars().count() == 1 && part.chars().all(char::is_alphabetic))
    {
        return true;
    }
    ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

/// Length of a leading list, numbering or quote marker.
fn leading_marker_len(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let marker_start = i;
    if i < bytes.len() && matches!(bytes[i], b'-' | b'*' | b'+' | b'>') {
        i += 1;
    } else {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == marker_start || i >= bytes.len() || !matches!(bytes[i], b'.' | b')') {
            return marker_start;
        }
        i += 1;
    }
    if i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        return marker_start;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn topic_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the word sets of two texts.
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    sentence: usize,
    #[serde(default)]
    sources: Vec<Value>,
}

/// Attributes the sentences of a unified report to pooled sources.
pub struct CitationAttributor {
    llm: Arc<dyn LLMClient>,
}

impl CitationAttributor {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Annotate `report_text` with citations into the sources of `reports`.
    ///
    /// Gateway and parse failures surface as `AttributionFailed`; callers
    /// recover with [`Attribution::unannotated`].
    pub async fn attribute(
        &self,
        report_text: &str,
        reports: &[&WorkerReport],
        plan: &[SubTask],
        cancel: &CancellationToken,
    ) -> Result<Attribution> {
        let pool = SourcePool::from_reports(reports);
        let spans = split_sentences(report_text);
        if pool.is_empty() || spans.is_empty() {
            debug!(sources = pool.len(), sentences = spans.len(), "nothing to attribute");
            return Ok(Attribution::unannotated(report_text));
        }

        let sentences: Vec<&str> = spans
            .iter()
            .map(|s| report_text[s.start..s.end].trim())
            .collect();
        let messages = vec![
            ConversationMessage::system(prompts::citation_system()),
            ConversationMessage::user(prompts::citation_user(&sentences, &pool.hits())),
        ];

        let response = match self.llm.complete(&messages, &[], cancel).await {
            Ok(response) => response,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => return Err(AppError::AttributionFailed(e.to_string())),
        };

        let claims = extract_json(&response.content)
            .and_then(|v| serde_json::from_value::<RawClaims>(v).ok())
            .ok_or_else(|| {
                AppError::AttributionFailed("the model reply is not a claims object".to_string())
            })?;

        let candidates = candidates_by_sentence(&claims.claims, spans.len(), &pool);
        let attribution = annotate(report_text, &spans, &candidates, &pool, plan, &sentences);
        info!(
            citations = attribution.citations.len(),
            sources = attribution.bibliography.len(),
            "report attributed"
        );
        Ok(attribution)
    }
}

/// Candidate pool indices per sentence index, in the order the model listed
/// them and without duplicates.
fn candidates_by_sentence(
    claims: &[RawClaim],
    sentence_count: usize,
    pool: &SourcePool,
) -> BTreeMap<usize, Vec<usize>> {
    let mut by_sentence: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for claim in claims {
        if claim.sentence == 0 || claim.sentence > sentence_count {
            continue;
        }
        let entry = by_sentence.entry(claim.sentence - 1).or_default();
        for idx in claim.sources.iter().filter_map(|r| pool.resolve(r)) {
            if !entry.contains(&idx) {
                entry.push(idx);
            }
        }
    }
    by_sentence.retain(|_, candidates| !candidates.is_empty());
    by_sentence
}

/// Pick one source for a claim: closest owning sub-task topic first, then
/// earliest in the pool.
fn choose_source(claim: &str, candidates: &[usize], pool: &SourcePool, plan: &[SubTask]) -> usize {
    let mut ordered = candidates.to_vec();
    ordered.sort_unstable();
    if ordered.len() == 1 {
        return ordered[0];
    }

    let claim_words = topic_words(claim);
    let score = |idx: usize| -> f64 {
        pool.sources[idx]
            .owners
            .iter()
            .filter_map(|owner| plan.iter().find(|t| &t.id == owner))
            .map(|task| overlap(&claim_words, &topic_words(&task.instructions)))
            .fold(0.0, f64::max)
    };

    let mut best = ordered[0];
    let mut best_score = score(best);
    for &idx in &ordered[1..] {
        let s = score(idx);
        if s > best_score {
            best = idx;
            best_score = s;
        }
    }
    best
}

fn annotate(
    text: &str,
    spans: &[Span],
    candidates: &BTreeMap<usize, Vec<usize>>,
    pool: &SourcePool,
    plan: &[SubTask],
    sentences: &[&str],
) -> Attribution {
    let mut ordinals: HashMap<usize, usize> = HashMap::new();
    let mut entries = Vec::new();
    let mut citations = Vec::new();
    let mut out = String::with_capacity(text.len() + candidates.len() * 5);
    let mut cursor = 0;

    // BTreeMap iteration walks sentences in text order.
    for (&sentence, options) in candidates {
        let span = spans[sentence];
        let chosen = choose_source(sentences[sentence], options, pool, plan);
        let source = &pool.sources[chosen];
        let next = ordinals.len() + 1;
        let ordinal = *ordinals.entry(chosen).or_insert_with(|| {
            entries.push(BibliographyEntry {
                ordinal: next,
                url: source.hit.url.clone(),
                title: bibliography_title(&source.hit),
            });
            next
        });

        let body = &text[span.start..span.end];
        let insert_at = span.start + body.trim_end_matches(['.', '!', '?']).len();
        let marker = format!(" [{}]", ordinal);

        out.push_str(&text[cursor..span.start]);
        let start = out.len();
        out.push_str(&text[span.start..insert_at]);
        out.push_str(&marker);
        out.push_str(&text[insert_at..span.end]);
        citations.push(Citation {
            ordinal,
            source_key: source.key.clone(),
            span_hint: (start, out.len()),
        });
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);

    Attribution {
        report_text: out,
        bibliography: Bibliography { entries },
        citations,
    }
}

fn bibliography_title(hit: &SourceHit) -> String {
    if !hit.title.trim().is_empty() {
        hit.title.trim().to_string()
    } else {
        hit.host.clone().unwrap_or_else(|| hit.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMResponse;
    use crate::research::types::WorkerStatus;
    use crate::types::ToolDefinition;
    use async_trait::async_trait;
    use rstest::rstest;

    struct CannedCitations(Result<LLMResponse>);

    #[async_trait]
    impl LLMClient for CannedCitations {
        async fn complete(
            &self,
            _messages: &[ConversationMessage],
            _tools: &[ToolDefinition],
            _cancel: &CancellationToken,
        ) -> Result<LLMResponse> {
            self.0.clone()
        }

        fn model_name(&self) -> &str {
            "citations"
        }
    }

    fn report(task_id: &str, urls: &[(&str, &str)]) -> WorkerReport {
        WorkerReport {
            task_id: task_id.into(),
            narrative: String::new(),
            sources_used: urls
                .iter()
                .map(|(url, title)| SourceHit::new(*url, *title, ""))
                .collect(),
            status: WorkerStatus::Ok,
            truncated: false,
            error: None,
        }
    }

    fn plan() -> Vec<SubTask> {
        vec![
            SubTask {
                id: "task-1".into(),
                instructions: "Rust language history and release timeline".into(),
                rationale: String::new(),
            },
            SubTask {
                id: "task-2".into(),
                instructions: "Async runtime ecosystem and tokio adoption".into(),
                rationale: String::new(),
            },
        ]
    }

    fn sentences_of(text: &str) -> Vec<&str> {
        split_sentences(text)
            .into_iter()
            .map(|s| text[s.start..s.end].trim())
            .collect()
    }

    #[test]
    fn test_split_sentences_skips_markdown_structure() {
        let text = "# Title\n\nRust 1.0 shipped in 2015. It was stable!\n\n```\nlet x = 1.0;\n```\n- Tokio is popular.\n| a | b |\n1. Version 1.5 added features";
        assert_eq!(
            sentences_of(text),
            vec![
                "Rust 1.0 shipped in 2015.",
                "It was stable!",
                "Tokio is popular.",
                "Version 1.5 added features"
            ]
        );
    }

    #[rstest]
    #[case::initialism(
        "The U.S. economy grew 5% in 2021. Dr. Smith agreed.",
        &["The U.S. economy grew 5% in 2021.", "Dr. Smith agreed."]
    )]
    #[case::title(
        "Mr. Lee and Prof. Park reviewed it. They approved.",
        &["Mr. Lee and Prof. Park reviewed it.", "They approved."]
    )]
    #[case::latin(
        "Some runtimes, e.g. tokio, are popular. Others, i.e. smol, are small.",
        &["Some runtimes, e.g. tokio, are popular.", "Others, i.e. smol, are small."]
    )]
    #[case::etc("It supports TCP, UDP, etc. in one crate.", &["It supports TCP, UDP, etc. in one crate."])]
    #[case::initial(
        "J. R. R. Tolkien wrote it in 1937. It sold well.",
        &["J. R. R. Tolkien wrote it in 1937.", "It sold well."]
    )]
    #[case::versions("Rust 1.0 shipped. Rust 2.0 did not.", &["Rust 1.0 shipped.", "Rust 2.0 did not."])]
    fn test_split_sentences_keeps_abbreviations(#[case] text: &str, #[case] expected: &[&str]) {
        assert_eq!(sentences_of(text), expected);
    }

    #[rstest]
    #[case("- item", 2)]
    #[case("  * item", 4)]
    #[case("12) item", 4)]
    #[case("> quoted", 2)]
    #[case("2025 was a year", 0)]
    #[case("-not a marker", 0)]
    fn test_leading_marker_len(#[case] line: &str, #[case] expected: usize) {
        assert_eq!(leading_marker_len(line), expected);
    }

    #[test]
    fn test_pool_dedupes_and_tracks_owners() {
        let a = report("task-1", &[("https://a.io/x/", "A"), ("https://b.io", "B")]);
        let b = report("task-2", &[("https://a.io/x?ref=1", "A again")]);
        let pool = SourcePool::from_reports(&[&a, &b]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.sources[0].owners, vec!["task-1", "task-2"]);
        assert_eq!(pool.sources[0].hit.title, "A");
    }

    #[rstest]
    #[case(serde_json::json!("S2"), Some(1))]
    #[case(serde_json::json!("[s1]"), Some(0))]
    #[case(serde_json::json!(2), Some(1))]
    #[case(serde_json::json!("https://B.io/"), Some(1))]
    #[case(serde_json::json!("S9"), None)]
    #[case(serde_json::json!(0), None)]
    #[case(serde_json::json!(null), None)]
    fn test_resolve_references(#[case] reference: Value, #[case] expected: Option<usize>) {
        let r = report("task-1", &[("https://a.io", "A"), ("https://b.io", "B")]);
        let pool = SourcePool::from_reports(&[&r]);
        assert_eq!(pool.resolve(&reference), expected);
    }

    #[tokio::test]
    async fn test_ordinals_follow_first_appearance() {
        let text = "Tokio dominates async Rust. Rust 1.0 shipped in 2015. Tokio 1.0 arrived in 2020.";
        let r1 = report("task-1", &[("https://blog.rust-lang.org/2015", "Rust 1.0")]);
        let r2 = report("task-2", &[("https://tokio.rs/blog", "")]);
        let reply = r#"{"claims": [{"sentence": 3, "sources": ["S2"]},
                                   {"sentence": 1, "sources": ["S2"]},
                                   {"sentence": 2, "sources": ["S1"]}]}"#;
        let attributor = CitationAttributor::new(Arc::new(CannedCitations(Ok(LLMResponse::text(reply)))));

        let out = attributor
            .attribute(text, &[&r1, &r2], &plan(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            out.report_text,
            "Tokio dominates async Rust [1]. Rust 1.0 shipped in 2015 [2]. Tokio 1.0 arrived in 2020 [1]."
        );
        let ordinals: Vec<usize> = out.bibliography.entries.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(out.bibliography.entries[0].title, "tokio.rs");
        assert_eq!(out.citations.len(), 3);

        let first = &out.citations[0];
        assert_eq!(
            &out.report_text[first.span_hint.0..first.span_hint.1],
            "Tokio dominates async Rust [1]."
        );
        let last = &out.citations[2];
        assert_eq!(
            &out.report_text[last.span_hint.0..last.span_hint.1],
            "Tokio 1.0 arrived in 2020 [1]."
        );
    }

    #[test]
    fn test_tie_break_prefers_matching_topic_then_pool_order() {
        let r1 = report("task-1", &[("https://history.example/rust", "History")]);
        let r2 = report("task-2", &[("https://tokio.rs", "Tokio")]);
        let pool = SourcePool::from_reports(&[&r1, &r2]);

        let chosen = choose_source("Tokio adoption across the async ecosystem grew.", &[0, 1], &pool, &plan());
        assert_eq!(chosen, 1);

        // No topical signal: earliest pooled source wins.
        let chosen = choose_source("Nothing in common here.", &[1, 0], &pool, &plan());
        assert_eq!(chosen, 0);
    }

    #[tokio::test]
    async fn test_empty_pool_skips_model() {
        let attributor = CitationAttributor::new(Arc::new(CannedCitations(Err(AppError::Internal(
            "must not be called".into(),
        )))));
        let r = report("task-1", &[]);
        let out = attributor
            .attribute("Plain text.", &[&r], &plan(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, Attribution::unannotated("Plain text."));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_attribution_failed() {
        let attributor = CitationAttributor::new(Arc::new(CannedCitations(Ok(LLMResponse::text(
            "I think sentence one is from S1",
        )))));
        let r = report("task-1", &[("https://a.io", "A")]);
        let err = attributor
            .attribute("A fact.", &[&r], &plan(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "attribution_failed");
    }

    #[tokio::test]
    async fn test_invalid_references_are_ignored() {
        let reply = r#"{"claims": [{"sentence": 7, "sources": ["S1"]}, {"sentence": 1, "sources": ["S5"]}]}"#;
        let attributor = CitationAttributor::new(Arc::new(CannedCitations(Ok(LLMResponse::text(reply)))));
        let r = report("task-1", &[("https://a.io", "A")]);
        let out = attributor
            .attribute("A fact.", &[&r], &plan(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.report_text, "A fact.");
        assert!(out.bibliography.is_empty());
    }
}
