//! Read-side aggregates for the status API.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use heirloom_airtable::records::restoration_fields;
use heirloom_airtable::{ListQuery, RecordStore, SortDirection};
use heirloom_core::batch::{BatchProgress, BatchState, StatusBreakdown};
use heirloom_core::job_status::JobStatus;
use heirloom_core::types::Timestamp;
use heirloom_db::{Job, JobPriority, JobStore};
use serde::Serialize;

use crate::error::PipelineError;

/// Number of recent Restorations records sampled for sync statistics.
pub const AIRTABLE_SAMPLE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub processing_time_seconds: f64,
    pub image_url: String,
    pub restoration_type: String,
    pub priority: JobPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<BatchReport>,
}

/// A job status lookup that may have missed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobLookup {
    Found(Box<JobStatusReport>),
    Missing { error: &'static str, job_id: String },
}

impl JobLookup {
    pub fn missing(job_id: impl Into<String>) -> Self {
        JobLookup::Missing {
            error: "Job not found",
            job_id: job_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchJobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub image_url: String,
    pub result_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub overall_status: BatchState,
    pub progress_percentage: f64,
    pub total_jobs: usize,
    pub status_breakdown: StatusBreakdown,
    /// Earliest member creation time.
    pub created_at: Timestamp,
    pub processing_time_seconds: f64,
    pub jobs: Vec<BatchJobSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecentActivity {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatistics {
    pub total_jobs: usize,
    pub status_breakdown: StatusBreakdown,
    pub last_24_hours: RecentActivity,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirtableStats {
    pub total_records: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub last_sync: Timestamp,
}

/// Job, batch and queue status views.
pub struct StatusReporter {
    jobs: Arc<dyn JobStore>,
    records: Option<Arc<dyn RecordStore>>,
    restorations_table: String,
}

impl StatusReporter {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            records: None,
            restorations_table: String::new(),
        }
    }

    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        self.records = Some(records);
        self.restorations_table = table.into();
        self
    }

    /// `None` when no job has this id.
    pub async fn job_status(&self, job_id: &str) -> Result<Option<JobStatusReport>, PipelineError> {
        let Some(job) = self.jobs.get(job_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let batch_info = match &job.batch_id {
            Some(batch_id) => self.batch_status(batch_id).await?,
            None => None,
        };

        Ok(Some(JobStatusReport {
            processing_time_seconds: job.processing_time_seconds(now),
            result_url: job.result_url().map(str::to_string),
            completed_at: job.completed_at(),
            error: job.error().map(str::to_string),
            job_id: job.job_id,
            status: job.status,
            created_at: job.created_at,
            image_url: job.image_url,
            restoration_type: job.restoration_type,
            priority: job.priority,
            batch_info,
        }))
    }

    /// `None` when the batch has no jobs.
    pub async fn batch_status(&self, batch_id: &str) -> Result<Option<BatchReport>, PipelineError> {
        let jobs = self.jobs.list_by_batch(batch_id).await?;
        Ok(batch_report(batch_id, &jobs, Utc::now()))
    }

    pub async fn queue_statistics(&self) -> Result<QueueStatistics, PipelineError> {
        self.queue_statistics_at(Utc::now()).await
    }

    /// Global breakdown plus activity in the 24 hours before `now`.
    pub async fn queue_statistics_at(&self, now: Timestamp) -> Result<QueueStatistics, PipelineError> {
        let breakdown = self.jobs.status_counts().await?;
        let recent = self.jobs.list_since(now - Duration::hours(24)).await?;
        let recent_breakdown = StatusBreakdown::from_statuses(recent.iter().map(|j| j.status));

        Ok(QueueStatistics {
            total_jobs: breakdown.total(),
            status_breakdown: breakdown,
            last_24_hours: RecentActivity {
                total_jobs: recent.len(),
                completed: recent_breakdown.completed,
                failed: recent_breakdown.failed,
                processing: recent_breakdown.processing,
            },
            timestamp: now,
        })
    }

    /// Processing_Status breakdown over the most recent Restorations records.
    pub async fn airtable_stats(&self) -> Result<AirtableStats, PipelineError> {
        let Some(records) = &self.records else {
            return Err(PipelineError::Validation(
                "record store statistics are not configured".into(),
            ));
        };
        let query = ListQuery::default()
            .limit(AIRTABLE_SAMPLE_SIZE)
            .sort_by(restoration_fields::LAST_UPDATED, SortDirection::Desc);
        let rows = records.list(&self.restorations_table, &query).await?;

        let mut status_breakdown = BTreeMap::new();
        for row in &rows {
            let status = row
                .str_field(restoration_fields::PROCESSING_STATUS)
                .unwrap_or("Unknown")
                .to_string();
            *status_breakdown.entry(status).or_insert(0) += 1;
        }

        Ok(AirtableStats {
            total_records: rows.len(),
            status_breakdown,
            last_sync: Utc::now(),
        })
    }

    /// Status of each id in request order; unknown ids are reported inline.
    pub async fn job_statuses(&self, job_ids: &[String]) -> Result<Vec<JobLookup>, PipelineError> {
        let mut reports = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            reports.push(match self.job_status(job_id).await? {
                Some(report) => JobLookup::Found(Box::new(report)),
                None => JobLookup::missing(job_id),
            });
        }
        Ok(reports)
    }
}

/// Aggregate `jobs` (all members of `batch_id`) as of `now`.
pub fn batch_report(batch_id: &str, jobs: &[Job], now: Timestamp) -> Option<BatchReport> {
    let created_at = jobs.iter().map(|j| j.created_at).min()?;
    let progress = BatchProgress::from_statuses(jobs.iter().map(|j| j.status));

    Some(BatchReport {
        batch_id: batch_id.to_string(),
        overall_status: progress.overall_status,
        progress_percentage: progress.progress_percentage,
        total_jobs: progress.total_jobs,
        status_breakdown: progress.status_breakdown,
        created_at,
        processing_time_seconds: (now - created_at).num_milliseconds() as f64 / 1000.0,
        jobs: jobs
            .iter()
            .map(|job| BatchJobSummary {
                job_id: job.job_id.clone(),
                status: job.status,
                image_url: job.image_url.clone(),
                result_url: job.result_url().map(str::to_string),
            })
            .collect(),
    })
}
