//! Batch creation and background scheduling.
//!
//! Every scheduled job runs as its own Tokio task. A supervisor task per
//! scheduling call collects their results into a [`BatchOutcome`] and
//! publishes `batch.finished`, so background failures are observable
//! through [`BatchCoordinator::wait`], [`BatchCoordinator::is_running`] and
//! the event bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use heirloom_db::{Job, JobStore, NewJob};
use heirloom_events::{event_types, EventBus, JobEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::restoration::{JobOutcome, RestorationPipeline};

/// Supervisor handle count that triggers folding finished groups into
/// summaries.
const RETAINED_GROUPS: usize = 256;

/// Uncollected summaries kept for `wait`; the oldest are dropped first.
const RETAINED_SUMMARIES: usize = 10_000;

/// One image of a batch request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchImage {
    pub image_url: String,
    #[serde(default)]
    pub restoration_type: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl BatchImage {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            ..Self::default()
        }
    }
}

/// Returned as soon as a batch is persisted and scheduled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchTicket {
    pub batch_id: String,
    pub job_ids: Vec<String>,
}

/// Result of every job scheduled under one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs that were no longer queued when their task started.
    pub skipped: usize,
    /// Tasks that returned an error instead of an outcome.
    pub errored: usize,
    pub panicked: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled + self.skipped + self.errored + self.panicked
    }

    fn merge(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.panicked += other.panicked;
    }

    fn record(&mut self, joined: Result<Result<JobOutcome, PipelineError>, tokio::task::JoinError>) {
        match joined {
            Ok(Ok(JobOutcome::Completed { .. })) => self.succeeded += 1,
            Ok(Ok(JobOutcome::Failed { .. })) => self.failed += 1,
            Ok(Ok(JobOutcome::Cancelled)) => self.cancelled += 1,
            Ok(Ok(JobOutcome::Skipped { .. })) => self.skipped += 1,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Scheduled job errored");
                self.errored += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled job task panicked or was aborted");
                self.panicked += 1;
            }
        }
    }
}

/// Creates batches and runs their jobs in the background.
pub struct BatchCoordinator {
    jobs: Arc<dyn JobStore>,
    pipeline: Arc<RestorationPipeline>,
    events: Arc<EventBus>,
    groups: Mutex<Groups>,
}

/// Scheduled work by group id.
#[derive(Default)]
struct Groups {
    running: HashMap<String, Vec<JoinHandle<BatchOutcome>>>,
    /// Outcomes of finished groups that nobody has waited for yet.
    finished: HashMap<String, BatchOutcome>,
    finished_order: VecDeque<String>,
}

impl Groups {
    /// Move every group whose supervisors have all finished out of
    /// `running`, keeping its outcome for a later `wait`.
    fn fold_finished(&mut self) {
        let done: Vec<String> = self
            .running
            .iter()
            .filter(|(_, handles)| handles.iter().all(JoinHandle::is_finished))
            .map(|(group, _)| group.clone())
            .collect();

        for group in done {
            let Some(handles) = self.running.remove(&group) else {
                continue;
            };
            let mut outcome = BatchOutcome::default();
            for handle in handles {
                match handle.now_or_never() {
                    Some(Ok(part)) => outcome.merge(part),
                    Some(Err(e)) => {
                        tracing::error!(group = %group, error = %e, "Batch supervisor failed")
                    }
                    None => {}
                }
            }
            if !self.finished.contains_key(&group) {
                self.finished_order.push_back(group.clone());
            }
            self.finished.entry(group).or_default().merge(outcome);
        }

        while self.finished.len() > RETAINED_SUMMARIES {
            let Some(oldest) = self.finished_order.pop_front() else {
                break;
            };
            self.finished.remove(&oldest);
        }
    }

    fn take_finished(&mut self, group: &str) -> Option<BatchOutcome> {
        let outcome = self.finished.remove(group)?;
        self.finished_order.retain(|g| g != group);
        Some(outcome)
    }
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<RestorationPipeline>, events: Arc<EventBus>) -> Self {
        Self {
            jobs: Arc::clone(pipeline.jobs()),
            pipeline,
            events,
            groups: Mutex::new(Groups::default()),
        }
    }

    /// Persist one queued job per image under a fresh batch id, then schedule
    /// them in order without waiting for any of them.
    pub async fn create_batch(&self, images: Vec<BatchImage>) -> Result<BatchTicket, PipelineError> {
        if images.is_empty() {
            return Err(PipelineError::Validation("images must not be empty".into()));
        }
        if let Some(pos) = images.iter().position(|i| i.image_url.trim().is_empty()) {
            return Err(PipelineError::Validation(format!(
                "images[{pos}].image_url is required"
            )));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let jobs: Vec<Job> = images
            .into_iter()
            .map(|image| {
                let restoration_type = image
                    .restoration_type
                    .unwrap_or_else(|| "standard".to_string());
                Job::new(
                    NewJob::new(image.image_url, restoration_type)
                        .in_batch(&batch_id)
                        .with_metadata(image.metadata),
                )
            })
            .collect();

        for job in &jobs {
            self.jobs.add(job).await?;
        }

        let job_ids: Vec<String> = jobs.iter().map(|j| j.job_id.clone()).collect();
        tracing::info!(%batch_id, jobs = job_ids.len(), "Batch created");
        self.events.publish(
            JobEvent::new(event_types::BATCH_CREATED)
                .with_batch(Some(&batch_id))
                .with_payload(json!({ "job_ids": job_ids })),
        );

        self.schedule(&batch_id, job_ids.clone()).await;
        Ok(BatchTicket { batch_id, job_ids })
    }

    /// Spawn one task per job and a supervisor for the group.
    ///
    /// `group` is the batch id for batches, or the originating record id for
    /// jobs scheduled straight from the webhook.
    pub async fn schedule(&self, group: &str, job_ids: Vec<String>) {
        let tasks: Vec<JoinHandle<Result<JobOutcome, PipelineError>>> = job_ids
            .into_iter()
            .map(|job_id| {
                let pipeline = Arc::clone(&self.pipeline);
                tokio::spawn(async move { pipeline.process(&job_id).await })
            })
            .collect();

        let events = Arc::clone(&self.events);
        let group_id = group.to_string();
        let supervisor = tokio::spawn(async move {
            let mut outcome = BatchOutcome::default();
            for joined in join_all(tasks).await {
                outcome.record(joined);
            }
            tracing::info!(
                group = %group_id,
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                cancelled = outcome.cancelled,
                errored = outcome.errored,
                panicked = outcome.panicked,
                "Scheduled jobs finished",
            );
            events.publish(
                JobEvent::new(event_types::BATCH_FINISHED)
                    .with_batch(Some(&group_id))
                    .with_payload(json!(outcome)),
            );
            outcome
        });

        let mut groups = self.groups.lock().await;
        if groups.running.len() >= RETAINED_GROUPS {
            groups.fold_finished();
        }
        groups
            .running
            .entry(group.to_string())
            .or_default()
            .push(supervisor);
    }

    /// Whether any work scheduled under `group` is still running.
    pub async fn is_running(&self, group: &str) -> bool {
        self.groups
            .lock()
            .await
            .running
            .get(group)
            .is_some_and(|handles| handles.iter().any(|h| !h.is_finished()))
    }

    /// Await everything scheduled under `group`.
    ///
    /// Returns `None` if nothing was scheduled under that id or it was
    /// already collected. Finished groups stay collectable until
    /// `RETAINED_SUMMARIES` newer ones have finished uncollected.
    pub async fn wait(&self, group: &str) -> Option<BatchOutcome> {
        let (handles, summary) = {
            let mut groups = self.groups.lock().await;
            (groups.running.remove(group), groups.take_finished(group))
        };
        if handles.is_none() && summary.is_none() {
            return None;
        }

        let mut outcome = summary.unwrap_or_default();
        for handle in handles.into_iter().flatten() {
            match handle.await {
                Ok(part) => outcome.merge(part),
                Err(e) => tracing::error!(group, error = %e, "Batch supervisor failed"),
            }
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_counts_every_kind() {
        let mut outcome = BatchOutcome::default();
        outcome.record(Ok(Ok(JobOutcome::Completed {
            result_url: "file:///x".into(),
        })));
        outcome.record(Ok(Ok(JobOutcome::Failed { error: "e".into() })));
        outcome.record(Ok(Ok(JobOutcome::Cancelled)));
        outcome.record(Ok(Err(PipelineError::Validation("bad".into()))));
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.cancelled, 1);
        assert_eq!(outcome.errored, 1);
        assert_eq!(outcome.total(), 4);

        let mut merged = BatchOutcome::default();
        merged.merge(outcome.clone());
        merged.merge(outcome);
        assert_eq!(merged.total(), 8);
    }

    #[test]
    fn batch_image_deserializes_with_defaults() {
        let image: BatchImage =
            serde_json::from_value(json!({ "image_url": "https://x/a.jpg" })).unwrap();
        assert_eq!(image.image_url, "https://x/a.jpg");
        assert!(image.restoration_type.is_none());
        assert!(image.metadata.is_empty());
    }
}
