//! Webhook-driven job creation from Restorations records.
//!
//! Signature verification happens at the HTTP edge; this module only sees
//! payloads that were already accepted.

use std::sync::Arc;

use chrono::Utc;
use heirloom_airtable::records::{restoration_fields, Attachment, RestorationRecord, RestorationUpdate};
use heirloom_airtable::RecordStore;
use heirloom_db::{Job, JobPriority, JobStore, NewJob};
use heirloom_events::{event_types, EventBus, JobEvent};
use serde::Deserialize;
use serde_json::json;

use crate::batch::BatchCoordinator;
use crate::error::PipelineError;

pub const RECORD_CREATED: &str = "record_created";
pub const RECORD_UPDATED: &str = "record_updated";

/// Body of a record-store webhook call.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub changed_fields: Vec<String>,
}

/// What a webhook call resulted in.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Created {
        record_id: String,
        jobs: Vec<Job>,
    },
    Reprocessed {
        record_id: String,
        cancelled: Vec<String>,
        jobs: Vec<Job>,
    },
    /// The update touched nothing that requires work.
    NoAction,
    /// Acknowledged but not acted on; reported inline to the caller.
    Rejected { error: String },
}

/// Turns Restorations webhook events into jobs.
pub struct RecordIntake {
    jobs: Arc<dyn JobStore>,
    records: Arc<dyn RecordStore>,
    coordinator: Arc<BatchCoordinator>,
    events: Arc<EventBus>,
    table: String,
}

impl RecordIntake {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        records: Arc<dyn RecordStore>,
        coordinator: Arc<BatchCoordinator>,
        events: Arc<EventBus>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            records,
            coordinator,
            events,
            table: table.into(),
        }
    }

    pub async fn handle(&self, payload: &WebhookPayload) -> Result<IntakeOutcome, PipelineError> {
        let record_id = || {
            payload
                .record_id
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| PipelineError::Validation("record_id is required".into()))
        };

        match payload.event_type.as_str() {
            RECORD_CREATED => self.record_created(record_id()?).await,
            RECORD_UPDATED => self.record_updated(record_id()?, &payload.changed_fields).await,
            other => {
                tracing::info!(event_type = other, "Ignoring unknown webhook type");
                Ok(IntakeOutcome::Rejected {
                    error: format!("Unknown webhook type: {other}"),
                })
            }
        }
    }

    /// Create one job per attachment and mark the record as started.
    pub async fn record_created(&self, record_id: &str) -> Result<IntakeOutcome, PipelineError> {
        let Some(record) = self.load(record_id).await? else {
            return Ok(not_found());
        };
        if record.original_images.is_empty() {
            return Ok(IntakeOutcome::Rejected {
                error: "No images found in record".into(),
            });
        }

        let jobs = self.create_jobs(&record).await?;
        self.update_record(record_id, RestorationUpdate::processing_started(Utc::now()))
            .await;
        self.schedule_if_urgent(&record, &jobs).await;

        tracing::info!(record_id, jobs = jobs.len(), "Jobs created from record");
        Ok(IntakeOutcome::Created {
            record_id: record_id.to_string(),
            jobs,
        })
    }

    /// Reprocess the record when a watched field changed and the reprocess
    /// flag is set: cancel its unfinished jobs and start over.
    pub async fn record_updated(
        &self,
        record_id: &str,
        changed_fields: &[String],
    ) -> Result<IntakeOutcome, PipelineError> {
        let watched = changed_fields
            .iter()
            .any(|f| restoration_fields::WATCHED.contains(&f.as_str()));
        if !watched {
            return Ok(IntakeOutcome::NoAction);
        }

        let Some(record) = self.load(record_id).await? else {
            return Ok(not_found());
        };
        if !record.reprocess_requested {
            return Ok(IntakeOutcome::NoAction);
        }

        let cancelled = self.jobs.cancel_for_record(record_id).await?;
        for job_id in &cancelled {
            self.events.publish(
                JobEvent::new(event_types::JOB_CANCELLED)
                    .with_job(job_id)
                    .with_record(Some(record_id)),
            );
        }

        let jobs = self.create_jobs(&record).await?;
        self.update_record(record_id, RestorationUpdate::reprocessing_started(Utc::now()))
            .await;
        self.schedule_if_urgent(&record, &jobs).await;

        tracing::info!(
            record_id,
            cancelled = cancelled.len(),
            jobs = jobs.len(),
            "Record reprocessed",
        );
        self.events.publish(
            JobEvent::new(event_types::RECORD_REPROCESSED)
                .with_record(Some(record_id))
                .with_payload(json!({
                    "cancelled": cancelled,
                    "jobs_created": jobs.len(),
                })),
        );
        Ok(IntakeOutcome::Reprocessed {
            record_id: record_id.to_string(),
            cancelled,
            jobs,
        })
    }

    async fn load(&self, record_id: &str) -> Result<Option<RestorationRecord>, PipelineError> {
        match self.records.get(&self.table, record_id).await? {
            Some(record) => Ok(Some(RestorationRecord::try_from(&record)?)),
            None => Ok(None),
        }
    }

    async fn create_jobs(&self, record: &RestorationRecord) -> Result<Vec<Job>, PipelineError> {
        let priority = JobPriority::parse(&record.processing_priority);
        let mut jobs = Vec::with_capacity(record.original_images.len());
        for attachment in &record.original_images {
            let mut input = NewJob::new(&attachment.url, &record.restoration_type)
                .for_record(&record.id)
                .with_priority(priority)
                .with_metadata(attachment_metadata(attachment));
            if let Some(filename) = &attachment.filename {
                input = input.with_filename(filename);
            }
            let job = Job::new(input);
            self.jobs.add(&job).await?;
            self.events.publish(
                JobEvent::new(event_types::JOB_QUEUED)
                    .with_job(&job.job_id)
                    .with_record(Some(&record.id))
                    .with_payload(json!({ "priority": priority })),
            );
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// High-priority jobs start right away; the rest wait for the dispatcher.
    async fn schedule_if_urgent(&self, record: &RestorationRecord, jobs: &[Job]) {
        let urgent: Vec<String> = jobs
            .iter()
            .filter(|job| job.priority == JobPriority::High)
            .map(|job| job.job_id.clone())
            .collect();
        if !urgent.is_empty() {
            tracing::info!(record_id = %record.id, jobs = urgent.len(), "Scheduling high-priority jobs");
            self.coordinator.schedule(&record.id, urgent).await;
        }
    }

    async fn update_record(&self, record_id: &str, fields: heirloom_airtable::Fields) {
        if let Err(e) = self.records.update(&self.table, record_id, fields).await {
            tracing::warn!(record_id, error = %e, "Failed to update restoration record");
        }
    }
}

fn not_found() -> IntakeOutcome {
    IntakeOutcome::Rejected {
        error: "Record not found".into(),
    }
}

fn attachment_metadata(attachment: &Attachment) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("original_filename".into(), json!(attachment.filename));
    metadata.insert("file_size".into(), json!(attachment.size.unwrap_or(0)));
    metadata.insert(
        "mime_type".into(),
        json!(attachment.mime_type.clone().unwrap_or_default()),
    );
    metadata.insert("airtable_attachment_id".into(), json!(attachment.id));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_optional_fields() {
        let payload: WebhookPayload =
            serde_json::from_value(json!({ "type": "record_created", "record_id": "rec1" })).unwrap();
        assert_eq!(payload.event_type, RECORD_CREATED);
        assert_eq!(payload.record_id.as_deref(), Some("rec1"));
        assert!(payload.changed_fields.is_empty());
        assert!(payload.table_name.is_none());
    }

    #[test]
    fn attachment_metadata_keeps_source_details() {
        let attachment = Attachment {
            id: "att1".into(),
            url: "https://dl.airtable.com/a.jpg".into(),
            filename: Some("a.jpg".into()),
            mime_type: Some("image/jpeg".into()),
            size: Some(1234),
        };
        let metadata = attachment_metadata(&attachment);
        assert_eq!(metadata["original_filename"], "a.jpg");
        assert_eq!(metadata["file_size"], 1234);
        assert_eq!(metadata["mime_type"], "image/jpeg");
        assert_eq!(metadata["airtable_attachment_id"], "att1");
    }
}
