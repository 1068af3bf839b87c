//! Broadcast bus for [`JobEvent`]s.
//!
//! [`EventBus`] is shared as `Arc<EventBus>` between the HTTP layer, the
//! batch coordinator and the dispatcher.

use chrono::Utc;
use heirloom_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Dot-separated event names published by the pipeline.
pub mod event_types {
    pub const JOB_QUEUED: &str = "job.queued";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const BATCH_CREATED: &str = "batch.created";
    pub const BATCH_FINISHED: &str = "batch.finished";
    pub const CHAIN_STEP_FINISHED: &str = "chain.step_finished";
    pub const CHAIN_FINISHED: &str = "chain.finished";
    pub const RECORD_REPROCESSED: &str = "record.reprocessed";
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// Something that happened to a job, batch, chain or external record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// One of [`event_types`].
    pub event_type: String,
    pub job_id: Option<String>,
    pub batch_id: Option<String>,
    pub record_id: Option<String>,
    /// Event-specific data.
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            batch_id: None,
            record_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Set the batch id if there is one.
    pub fn with_batch(mut self, batch_id: Option<impl Into<String>>) -> Self {
        self.batch_id = batch_id.map(Into::into);
        self
    }

    /// Set the originating record id if there is one.
    pub fn with_record(mut self, record_id: Option<impl Into<String>>) -> Self {
        self.record_id = record_id.map(Into::into);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use heirloom_events::bus::{EventBus, JobEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::new("job.queued").with_job("job-1"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity. Slow receivers see
    /// `RecvError::Lagged` once the buffer overflows.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
