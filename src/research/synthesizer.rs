use crate::llm::{ConversationMessage, LLMClient};
use crate::research::prompts;
use crate::research::types::{SubTask, WorkerReport};
use crate::types::{AppError, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Merges the successful worker reports into one unified report.
pub struct Synthesizer {
    llm: Arc<dyn LLMClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// `reports` must hold at least one successful report.
    pub async fn synthesize(
        &self,
        query: &str,
        plan: &[SubTask],
        reports: &[&WorkerReport],
        cancel: &CancellationToken,
    ) -> Result<String> {
        if reports.is_empty() {
            return Err(AppError::SynthesisFailed(
                "no successful worker reports to merge".to_string(),
            ));
        }

        let messages = vec![
            ConversationMessage::system(prompts::synthesis_system(&Utc::now())),
            ConversationMessage::user(prompts::synthesis_user(query, reports, plan)),
        ];

        let response = match self.llm.complete(&messages, &[], cancel).await {
            Ok(response) => response,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => return Err(AppError::SynthesisFailed(e.to_string())),
        };

        let text = response.content.trim();
        if text.is_empty() {
            return Err(AppError::SynthesisFailed(
                "the model returned an empty report".to_string(),
            ));
        }

        info!(reports = reports.len(), chars = text.len(), "report synthesized");
        Ok(text.to_string())
    }
}
