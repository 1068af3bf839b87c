//! Per-job restoration state machine.
//!
//! `queued -> processing` is persisted (via [`JobStore::claim`]) before the
//! source image is fetched. The job then ends in exactly one of
//! `completed` or `failed`, unless it was cancelled while in flight, in
//! which case the cancellation stands and the result is discarded.

use std::sync::Arc;

use chrono::Utc;
use heirloom_airtable::records::RestorationUpdate;
use heirloom_airtable::RecordStore;
use heirloom_core::job_status::JobStatus;
use heirloom_core::prompt::GenerationParams;
use heirloom_db::{DbError, Job, JobResult, JobStore, NewJob};
use heirloom_events::{event_types, EventBus, JobEvent};
use heirloom_gemini::{GenerationRequest, ImageGenerator, InputImage};
use serde_json::json;

use crate::codec::normalize;
use crate::error::PipelineError;
use crate::fetch::ImageFetcher;
use crate::storage::ResultStore;

/// How one [`RestorationPipeline::process`] call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { result_url: String },
    Failed { error: String },
    /// The job was cancelled while its generation call was running.
    Cancelled,
    /// The job was no longer queued when processing was requested.
    Skipped { status: JobStatus },
}

/// Where to mirror job outcomes for jobs created from external records.
struct RecordSync {
    store: Arc<dyn RecordStore>,
    table: String,
}

/// Drives a single job from `queued` to a terminal state.
pub struct RestorationPipeline {
    jobs: Arc<dyn JobStore>,
    fetcher: Arc<dyn ImageFetcher>,
    generator: Arc<dyn ImageGenerator>,
    results: Arc<dyn ResultStore>,
    events: Arc<EventBus>,
    records: Option<RecordSync>,
}

impl RestorationPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        fetcher: Arc<dyn ImageFetcher>,
        generator: Arc<dyn ImageGenerator>,
        results: Arc<dyn ResultStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            jobs,
            fetcher,
            generator,
            results,
            events,
            records: None,
        }
    }

    /// Push outcomes of record-originated jobs to `table` in `store`.
    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        self.records = Some(RecordSync {
            store,
            table: table.into(),
        });
        self
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Create a job and process it to completion before returning its final
    /// state.
    pub async fn submit(&self, input: NewJob) -> Result<Job, PipelineError> {
        let job = Job::new(input);
        self.jobs.add(&job).await?;
        self.publish(event_types::JOB_QUEUED, &job, json!({}));
        tracing::info!(job_id = %job.job_id, "Job queued for immediate processing");

        self.process(&job.job_id).await?;
        self.jobs
            .get(&job.job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "Job",
                id: job.job_id.clone(),
            })
    }

    /// Run one queued job.
    ///
    /// Failures inside fetch, generation or persistence end up as a `failed`
    /// job, not as an `Err`; `Err` is reserved for the job store itself
    /// being unusable or the job not existing.
    pub async fn process(&self, job_id: &str) -> Result<JobOutcome, PipelineError> {
        let Some(job) = self.jobs.claim(job_id).await? else {
            return match self.jobs.get(job_id).await? {
                Some(job) => {
                    tracing::debug!(job_id, status = %job.status, "Job not queued, skipping");
                    Ok(JobOutcome::Skipped { status: job.status })
                }
                None => Err(PipelineError::NotFound {
                    entity: "Job",
                    id: job_id.to_string(),
                }),
            };
        };

        tracing::info!(
            job_id,
            batch_id = job.batch_id.as_deref().unwrap_or("-"),
            restoration_type = %job.restoration_type,
            "Restoration started",
        );
        self.publish(event_types::JOB_STARTED, &job, json!({}));

        match self.execute(&job).await {
            Ok(result_url) => self.complete(&job, result_url).await,
            Err(e) => self.fail(&job, e.to_string()).await,
        }
    }

    /// Fetch, normalise, generate and persist. Returns the result URL.
    async fn execute(&self, job: &Job) -> Result<String, PipelineError> {
        let source = self.fetcher.fetch(&job.image_url).await?;
        let normalized = normalize(&source)?;

        let params = GenerationParams::from_json(&serde_json::Value::Object(job.metadata.clone()))
            .capped();
        let request = GenerationRequest::new(InputImage::png(normalized), &job.restoration_directive)
            .with_params(params)
            .image_only(true);

        let output = self.generator.generate(request).await?;
        let image = output
            .first_image()
            .ok_or_else(|| PipelineError::NoImage {
                model: output.model.clone(),
            })?;

        let asset = self.results.save_job_result(job, image).await?;
        Ok(asset.url)
    }

    async fn complete(&self, job: &Job, result_url: String) -> Result<JobOutcome, PipelineError> {
        let updated = self
            .jobs
            .update_status(
                &job.job_id,
                JobStatus::Completed,
                Some(JobResult::completed(result_url.clone())),
            )
            .await;

        match updated {
            Ok(job) => {
                tracing::info!(job_id = %job.job_id, %result_url, "Restoration completed");
                self.publish(
                    event_types::JOB_COMPLETED,
                    &job,
                    json!({ "result_url": result_url }),
                );
                self.sync_record(&job, RestorationUpdate::completed(&result_url, Utc::now()))
                    .await;
                Ok(JobOutcome::Completed { result_url })
            }
            Err(e) => self.discarded(job, e),
        }
    }

    async fn fail(&self, job: &Job, error: String) -> Result<JobOutcome, PipelineError> {
        tracing::warn!(job_id = %job.job_id, error = %error, "Restoration failed");
        let updated = self
            .jobs
            .update_status(
                &job.job_id,
                JobStatus::Failed,
                Some(JobResult::failed(error.clone())),
            )
            .await;

        match updated {
            Ok(job) => {
                self.publish(event_types::JOB_FAILED, &job, json!({ "error": error }));
                self.sync_record(&job, RestorationUpdate::failed(&error, Utc::now()))
                    .await;
                Ok(JobOutcome::Failed { error })
            }
            Err(e) => self.discarded(job, e),
        }
    }

    /// A rejected final write means someone cancelled the job meanwhile.
    fn discarded(&self, job: &Job, error: DbError) -> Result<JobOutcome, PipelineError> {
        match error {
            DbError::InvalidTransition {
                from: JobStatus::Cancelled,
                ..
            } => {
                tracing::info!(
                    job_id = %job.job_id,
                    "Job cancelled while in flight, result discarded",
                );
                Ok(JobOutcome::Cancelled)
            }
            other => Err(other.into()),
        }
    }

    /// Best-effort mirror of the outcome onto the originating record.
    async fn sync_record(&self, job: &Job, fields: heirloom_airtable::Fields) {
        let (Some(sync), Some(record_id)) = (&self.records, &job.originating_record_id) else {
            return;
        };
        if let Err(e) = sync.store.update(&sync.table, record_id, fields).await {
            tracing::warn!(
                job_id = %job.job_id,
                record_id = %record_id,
                error = %e,
                "Failed to propagate job outcome to record store",
            );
        }
    }

    fn publish(&self, event_type: &str, job: &Job, payload: serde_json::Value) {
        self.events.publish(
            JobEvent::new(event_type)
                .with_job(&job.job_id)
                .with_batch(job.batch_id.as_deref())
                .with_record(job.originating_record_id.as_deref())
                .with_payload(payload),
        );
    }
}
