//! Restoration job entity and creation DTO.

use std::fmt;

use chrono::Utc;
use heirloom_core::job_status::JobStatus;
use heirloom_core::restoration::directive_for;
use heirloom_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Scheduling priority carried over from the originating record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    #[default]
    Normal,
    High,
}

impl JobPriority {
    /// `"high"` in any case is high priority; everything else is normal.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("high") {
            JobPriority::High
        } else {
            JobPriority::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome attached to a job. Success and failure fields never
/// coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Completed {
        result_url: String,
        completed_at: Timestamp,
    },
    Failed {
        error: String,
        failed_at: Timestamp,
    },
}

impl JobResult {
    pub fn completed(result_url: impl Into<String>) -> Self {
        JobResult::Completed {
            result_url: result_url.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        JobResult::Failed {
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

/// One restoration unit: a single source image and the directive to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub batch_id: Option<String>,
    pub originating_record_id: Option<String>,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub image_url: String,
    pub filename: Option<String>,
    pub restoration_type: String,
    pub restoration_directive: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub result: Option<JobResult>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Materialise a queued job with a fresh id.
    pub fn new(input: NewJob) -> Self {
        let created_at = input.created_at.unwrap_or_else(Utc::now);
        let restoration_directive = input
            .restoration_directive
            .unwrap_or_else(|| directive_for(&input.restoration_type));
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            batch_id: input.batch_id,
            originating_record_id: input.originating_record_id,
            status: JobStatus::Queued,
            priority: input.priority,
            image_url: input.image_url,
            filename: input.filename,
            restoration_type: input.restoration_type,
            restoration_directive,
            metadata: input.metadata,
            result: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn result_url(&self) -> Option<&str> {
        match &self.result {
            Some(JobResult::Completed { result_url, .. }) => Some(result_url),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        match &self.result {
            Some(JobResult::Completed { completed_at, .. }) => Some(*completed_at),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            Some(JobResult::Failed { error, .. }) => Some(error),
            _ => None,
        }
    }

    /// Seconds between creation and `now`.
    pub fn processing_time_seconds(&self, now: Timestamp) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Input for [`Job::new`].
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub image_url: String,
    pub restoration_type: String,
    /// Explicit prompt text; derived from `restoration_type` when absent.
    pub restoration_directive: Option<String>,
    pub batch_id: Option<String>,
    pub originating_record_id: Option<String>,
    pub priority: JobPriority,
    pub filename: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Override the creation timestamp (imports and tests).
    pub created_at: Option<Timestamp>,
}

impl NewJob {
    pub fn new(image_url: impl Into<String>, restoration_type: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            restoration_type: restoration_type.into(),
            ..Self::default()
        }
    }

    pub fn in_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn for_record(mut self, record_id: impl Into<String>) -> Self {
        self.originating_record_id = Some(record_id.into());
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.restoration_directive = Some(directive.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }
}
