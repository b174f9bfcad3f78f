use crate::llm::{LLMClient, ResearchClients};
use crate::research::citation::{Attribution, CitationAttributor};
use crate::research::dispatcher::Dispatcher;
use crate::research::events::{EventPublisher, EventStream, ResearchEvent};
use crate::research::planner::Planner;
use crate::research::synthesizer::Synthesizer;
use crate::research::types::{FinalReport, ResearchQuery, ResearchSettings, RunState};
use crate::research::worker::InvestigationWorker;
use crate::tools::search::WebCapabilities;
use crate::types::{AppError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Drives one research run from query to terminal event.
#[derive(Clone)]
pub struct ResearchCoordinator {
    lead: Arc<dyn LLMClient>,
    worker: Arc<dyn LLMClient>,
    citation: Arc<dyn LLMClient>,
    web: Arc<dyn WebCapabilities>,
    settings: ResearchSettings,
}

impl ResearchCoordinator {
    pub fn new(
        clients: ResearchClients,
        web: Arc<dyn WebCapabilities>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            lead: clients.lead,
            worker: clients.worker,
            citation: clients.citation,
            web,
            settings,
        }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Start the run in the background and return its event stream.
    ///
    /// Dropping the stream cancels the run.
    pub fn stream(&self, query: ResearchQuery) -> EventStream {
        self.stream_with_cancel(query, CancellationToken::new())
    }

    /// Like [`Self::stream`], but also cancelled through `cancel`.
    pub fn stream_with_cancel(&self, query: ResearchQuery, cancel: CancellationToken) -> EventStream {
        let (events, stream) = EventPublisher::channel();
        let guard = cancel.clone().drop_guard();
        let coordinator = self.clone();
        tokio::spawn(async move {
            // The outcome already reached the stream as its terminal event.
            let _ = coordinator.run(query, &events, &cancel).await;
        });
        stream.with_drop_guard(guard)
    }

    /// Execute the run, publishing progress and exactly one terminal event.
    pub async fn run(
        &self,
        query: ResearchQuery,
        events: &EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        let span = info_span!("research_run", run_id = %query.run_id);
        async move {
            info!(query = %query.text, "research run started");
            events.publish(ResearchEvent::RunCreated {
                run_id: query.run_id.clone(),
                query: query.text.clone(),
            });

            let outcome = match self.execute(&query, events, cancel).await {
                _ if cancel.is_cancelled() => Err(AppError::Cancelled),
                other => other,
            };

            match outcome {
                Ok(report) => {
                    info!(
                        citations = report.citations.len(),
                        sources = report.bibliography.len(),
                        "research run finished"
                    );
                    events.finish(ResearchEvent::FinalReport {
                        report_text: report.report_text.clone(),
                        bibliography: report.bibliography.clone(),
                    });
                    Ok(report)
                }
                Err(e) => {
                    match &e {
                        AppError::Cancelled => warn!("research run cancelled"),
                        other => error!(kind = other.kind(), error = %other, "research run failed"),
                    }
                    events.finish(ResearchEvent::from_error(&e));
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        query: &ResearchQuery,
        events: &EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        let mut state = RunState::new(query.clone());

        let plan = Planner::new(self.lead.clone(), self.settings.max_subtasks)
            .plan(query, events, cancel)
            .await?;
        ensure_running(cancel)?;
        events.publish(ResearchEvent::LeadAnswer {
            plan_text: plan.render(),
            subtasks: plan.subtasks.clone(),
        });
        state.plan = plan.subtasks;

        let worker = InvestigationWorker::new(
            self.worker.clone(),
            self.web.clone(),
            events.clone(),
            self.settings.clone(),
        );
        let dispatcher = Dispatcher::new(
            worker,
            events.clone(),
            self.settings.concurrency,
            self.settings.worker_timeout,
        );
        state.reports = dispatcher.dispatch(&state.plan, cancel).await?;
        ensure_running(cancel)?;

        let successes = state.successful_reports();
        let unified = Synthesizer::new(self.lead.clone())
            .synthesize(&query.text, &state.plan, &successes, cancel)
            .await?;
        ensure_running(cancel)?;

        let attribution = match CitationAttributor::new(self.citation.clone())
            .attribute(&unified, &successes, &state.plan, cancel)
            .await
        {
            Ok(attribution) => attribution,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                warn!(error = %e, "citation attribution failed, returning the report without citations");
                Attribution::unannotated(unified.clone())
            }
        };
        state.bibliography = attribution.bibliography.clone();

        Ok(FinalReport {
            run_id: state.query.run_id,
            report_text: attribution.report_text,
            bibliography: state.bibliography,
            citations: attribution.citations,
        })
    }
}

fn ensure_running(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}
