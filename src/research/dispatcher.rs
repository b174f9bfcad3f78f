use crate::research::events::{EventPublisher, ResearchEvent};
use crate::research::types::{SubTask, WorkerReport};
use crate::research::worker::InvestigationWorker;
use crate::types::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// Runs one worker per sub-task with at most `concurrency` in flight.
pub struct Dispatcher {
    worker: InvestigationWorker,
    events: EventPublisher,
    concurrency: usize,
    worker_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        worker: InvestigationWorker,
        events: EventPublisher,
        concurrency: usize,
        worker_timeout: Duration,
    ) -> Self {
        Self {
            worker,
            events,
            concurrency: concurrency.max(1),
            worker_timeout,
        }
    }

    /// Execute every sub-task and return their reports in submission order.
    ///
    /// A failed or timed-out worker produces a report instead of aborting its
    /// siblings. Fails with `AllSubtasksFailed` when no report is `ok`, and
    /// with `Cancelled` when the run is cancelled before any worker settled.
    pub async fn dispatch(
        &self,
        tasks: &[SubTask],
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkerReport>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, task) in tasks.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let worker = self.worker.clone();
            let cancel = cancel.clone();
            let timeout = self.worker_timeout;
            let span = info_span!("worker", task_id = %task.id);

            set.spawn(
                async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return (index, task.id, Err(AppError::Cancelled)),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return (index, task.id, Err(AppError::Cancelled)),
                        },
                    };
                    // The timeout clock starts once the worker holds a slot.
                    let deadline = Instant::now() + timeout;
                    let outcome = worker.investigate(&task, deadline, &cancel).await;
                    (index, task.id, outcome)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<WorkerReport>> = vec![None; tasks.len()];
        while let Some(joined) = set.join_next().await {
            let (index, task_id, outcome) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    // Panicked worker: the JoinError does not say which one.
                    warn!(error = %e, "worker task aborted");
                    continue;
                }
            };
            match outcome {
                Ok(report) => {
                    self.events.publish(ResearchEvent::SubagentCompleted {
                        task_id: report.task_id.clone(),
                        status: report.status,
                        sources: report.sources_used.len(),
                        truncated: report.truncated,
                    });
                    slots[index] = Some(report);
                }
                Err(AppError::Cancelled) => {}
                Err(e) => {
                    let report = WorkerReport::failed(task_id, e.to_string());
                    self.events.publish(ResearchEvent::SubagentCompleted {
                        task_id: report.task_id.clone(),
                        status: report.status,
                        sources: 0,
                        truncated: false,
                    });
                    slots[index] = Some(report);
                }
            }
        }

        if cancel.is_cancelled() && slots.iter().all(Option::is_none) {
            return Err(AppError::Cancelled);
        }

        // Workers lost to a panic still count as failed attempts.
        let reports: Vec<WorkerReport> = slots
            .into_iter()
            .zip(tasks)
            .filter_map(|(slot, task)| match slot {
                Some(report) => Some(report),
                None if cancel.is_cancelled() => None,
                None => {
                    let report = WorkerReport::failed(task.id.clone(), "worker task aborted");
                    self.events.publish(ResearchEvent::SubagentCompleted {
                        task_id: report.task_id.clone(),
                        status: report.status,
                        sources: 0,
                        truncated: false,
                    });
                    Some(report)
                }
            })
            .collect();

        let succeeded = reports.iter().filter(|r| r.is_ok()).count();
        info!(
            attempted = tasks.len(),
            succeeded,
            failed = reports.len() - succeeded,
            "dispatch finished"
        );

        if succeeded == 0 && !cancel.is_cancelled() {
            return Err(AppError::AllSubtasksFailed {
                attempted: tasks.len(),
            });
        }
        Ok(reports)
    }
}
