//! Prompt templates for the research stages.
//!
//! Every system prompt is stamped with the current date so models can reason
//! about recency.

use crate::research::types::{SourceHit, SubTask, WorkerReport};
use chrono::{DateTime, Utc};

fn stamp(now: &DateTime<Utc>) -> String {
    now.format("%A, %B %-d, %Y %H:%M UTC").to_string()
}

pub fn planner_system(now: &DateTime<Utc>, max_subtasks: usize) -> String {
    format!(
        r#"You are the lead of a research team. The current date is {date}.

Break the user's question into independent sub-topics that separate researchers
can investigate in parallel without coordinating. Decide first whether the
question is depth-first (one topic, several perspectives), breadth-first
(several distinct sub-questions) or straightforward (one focused lookup), and
size the plan to match: one sub-task for a straightforward question, usually
three, never more than {max}.

Each sub-task must have crisp boundaries so no two researchers duplicate work.
Write instructions a researcher can follow without seeing the original
question: what to find, which kinds of sources to prefer, and what the answer
should contain.

Reply with JSON only, in this shape:
{{"approach": "<one paragraph describing the plan>",
  "subtasks": [{{"instructions": "<what to research>", "rationale": "<why it matters>"}}]}}"#,
        date = stamp(now),
        max = max_subtasks
    )
}

pub fn planner_user(query: &str) -> String {
    format!("Research question:\n{}", query)
}

pub fn worker_system(now: &DateTime<Utc>, budget: usize) -> String {
    format!(
        r#"You are a research assistant working on one sub-topic for a lead researcher.
The current date is {date}.

Use `web_search` to find candidate sources and `web_fetch` to read the most
promising ones in full. Keep search queries short and moderately broad, and
narrow them only when results are plentiful. Prefer primary sources over
aggregators, and when sources disagree favour the most recent and reputable.

You may make at most {budget} tool calls. Stop searching as soon as you have
enough to answer well.

When you are done, reply without calling any tool. Write a concise,
information-dense report in Markdown, in the language of the task. State
each fact in a complete sentence. Do not add citation markers or URLs; a
separate step attributes sources."#,
        date = stamp(now),
        budget = budget
    )
}

pub fn worker_user(task: &SubTask) -> String {
    if task.rationale.is_empty() {
        format!("Task:\n{}", task.instructions)
    } else {
        format!(
            "Task:\n{}\n\nWhy this matters:\n{}",
            task.instructions, task.rationale
        )
    }
}

pub fn synthesis_system(now: &DateTime<Utc>) -> String {
    format!(
        r#"You are the lead of a research team writing the final report. The current
date is {date}.

You will receive the user's question and the reports of several researchers.
Merge them into one coherent Markdown report that answers the question
directly. Combine overlapping findings into single statements, keep distinct
findings distinct, and keep each factual claim in its own sentence worded
close to the researcher's phrasing so it can be traced back to its source.
Do not invent facts and do not add citation markers or URLs."#,
        date = stamp(now)
    )
}

pub fn synthesis_user(query: &str, reports: &[&WorkerReport], plan: &[SubTask]) -> String {
    let mut out = format!("Research question:\n{}\n", query);
    for report in reports {
        let topic = plan
            .iter()
            .find(|t| t.id == report.task_id)
            .map(|t| t.instructions.as_str())
            .unwrap_or_default();
        out.push_str(&format!(
            "\n## Report {} ({})\n{}\n",
            report.task_id, topic, report.narrative
        ));
    }
    out
}

pub fn citation_system() -> String {
    r#"You attribute the sentences of a research report to the sources it was written from.

You will receive the report split into numbered sentences and a numbered list of
sources. For every sentence that states a fact supported by one or more
sources, list the supporting source ids, best match first. Skip sentences that
are headings, opinions or transitions, and never cite a source that does not
support the sentence.

Reply with JSON only, in this shape:
{"claims": [{"sentence": 3, "sources": ["S2", "S5"]}]}"#
        .to_string()
}

pub fn citation_user(sentences: &[&str], sources: &[&SourceHit]) -> String {
    let mut out = String::from("Sentences:\n");
    for (i, sentence) in sentences.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, sentence));
    }
    out.push_str("\nSources:\n");
    for (i, source) in sources.iter().enumerate() {
        out.push_str(&format!("[S{}] {} ({})", i + 1, source.title, source.url));
        if !source.snippet.is_empty() {
            out.push_str(&format!(": {}", source.snippet));
        }
        out.push('\n');
    }
    out
}
