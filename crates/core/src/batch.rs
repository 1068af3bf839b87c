//! Batch progress aggregation.
//!
//! A batch has no stored entity of its own; its state is a pure function of
//! the statuses of its member jobs.

use serde::Serialize;

use crate::job_status::JobStatus;

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusBreakdown {
    /// Count the given statuses.
    pub fn from_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        let mut breakdown = Self::default();
        for status in statuses {
            breakdown.record(status);
        }
        breakdown
    }

    /// Add one job with `status` to the counts.
    pub fn record(&mut self, status: JobStatus) {
        self.add(status, 1);
    }

    /// Add `count` jobs with `status` to the counts.
    pub fn add(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Queued => self.queued += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed + self.cancelled
    }

    /// Jobs that still have work ahead of them.
    pub fn active(&self) -> usize {
        self.queued + self.processing
    }
}

/// Overall state of a batch derived from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Completed,
    Failed,
    Unknown,
}

/// Aggregate view over all jobs sharing one `batch_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub overall_status: BatchState,
    pub progress_percentage: f64,
    pub total_jobs: usize,
    pub status_breakdown: StatusBreakdown,
}

impl BatchProgress {
    pub fn from_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        Self::from_breakdown(StatusBreakdown::from_statuses(statuses))
    }

    pub fn from_breakdown(breakdown: StatusBreakdown) -> Self {
        let total = breakdown.total();
        Self {
            overall_status: overall_status(&breakdown),
            progress_percentage: progress_percentage(breakdown.completed, total),
            total_jobs: total,
            status_breakdown: breakdown,
        }
    }
}

/// Derive the overall batch state.
///
/// - `failed` iff every job failed
/// - `completed` iff every job completed
/// - `processing` iff any job is queued or processing
/// - `unknown` otherwise, including an empty batch
pub fn overall_status(breakdown: &StatusBreakdown) -> BatchState {
    let total = breakdown.total();
    if total == 0 {
        BatchState::Unknown
    } else if breakdown.failed == total {
        BatchState::Failed
    } else if breakdown.completed == total {
        BatchState::Completed
    } else if breakdown.active() > 0 {
        BatchState::Processing
    } else {
        BatchState::Unknown
    }
}

/// Completed share of the batch in percent, rounded to two decimals.
///
/// Returns `0.0` for an empty batch.
pub fn progress_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = completed as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
