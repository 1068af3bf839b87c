//! The `JobStore` port.

use async_trait::async_trait;
use heirloom_core::batch::StatusBreakdown;
use heirloom_core::job_status::JobStatus;
use heirloom_core::types::Timestamp;

use crate::error::DbError;
use crate::models::{Job, JobResult};

/// Keyed storage for restoration jobs.
///
/// Implementations enforce the forward-only status rules of
/// [`JobStatus::can_transition_to`]; the only way back to `queued` is
/// [`JobStore::requeue`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created job. Fails with [`DbError::Duplicate`] if
    /// the id is taken.
    async fn add(&self, job: &Job) -> Result<(), DbError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DbError>;

    /// Atomically move a queued job to `processing`.
    ///
    /// Returns `None` when the job is missing or no longer queued, which is
    /// how at most one processor per job is guaranteed.
    async fn claim(&self, job_id: &str) -> Result<Option<Job>, DbError>;

    /// Move a job to `status`, attaching `result` when given.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<Job, DbError>;

    /// Explicit reprocess: reset a terminal job to `queued` and clear its result.
    async fn requeue(&self, job_id: &str) -> Result<Job, DbError>;

    /// Jobs of one batch, oldest first.
    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Job>, DbError>;

    /// Jobs created at or after `since`, oldest first.
    async fn list_since(&self, since: Timestamp) -> Result<Vec<Job>, DbError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DbError>;

    async fn list_by_record(&self, record_id: &str) -> Result<Vec<Job>, DbError>;

    /// Queued jobs in dispatch order: high priority first, then oldest.
    async fn next_queued(&self, limit: usize) -> Result<Vec<Job>, DbError>;

    /// Cancel every non-terminal job tied to `record_id`. Returns the ids of
    /// the jobs that were cancelled.
    async fn cancel_for_record(&self, record_id: &str) -> Result<Vec<String>, DbError>;

    /// Global per-status job counts.
    async fn status_counts(&self) -> Result<StatusBreakdown, DbError>;
}

/// Statuses from which `next` may be reached.
pub(crate) fn predecessors(next: JobStatus) -> Vec<JobStatus> {
    JobStatus::ALL
        .into_iter()
        .filter(|status| status.can_transition_to(next))
        .collect()
}
