//! Background job dispatcher.
//!
//! Polls the job store every `poll_interval` for queued jobs (high priority
//! first, then oldest) and runs them through the [`RestorationPipeline`] one
//! at a time. Claiming in the pipeline makes it safe to run alongside batch
//! and webhook scheduling.

use std::sync::Arc;
use std::time::Duration;

use heirloom_db::JobStore;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::restoration::{JobOutcome, RestorationPipeline};

/// Default polling interval for the dispatcher loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Jobs picked up per cycle.
const DEFAULT_BATCH_SIZE: usize = 10;

pub struct JobDispatcher {
    jobs: Arc<dyn JobStore>,
    pipeline: Arc<RestorationPipeline>,
    poll_interval: Duration,
    batch_size: usize,
}

impl JobDispatcher {
    pub fn new(pipeline: Arc<RestorationPipeline>) -> Self {
        Self {
            jobs: Arc::clone(pipeline.jobs()),
            pipeline,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_once(&cancel).await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One cycle: process up to `batch_size` queued jobs. Returns how many
    /// were processed to a terminal state.
    pub async fn dispatch_once(&self, cancel: &CancellationToken) -> Result<usize, PipelineError> {
        let queued = self.jobs.next_queued(self.batch_size).await?;
        if queued.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = queued.len(), "Dispatching queued jobs");

        let mut processed = 0;
        for job in queued {
            if cancel.is_cancelled() {
                break;
            }
            match self.pipeline.process(&job.job_id).await? {
                JobOutcome::Skipped { .. } => {}
                outcome => {
                    tracing::debug!(job_id = %job.job_id, ?outcome, "Dispatched job finished");
                    processed += 1;
                }
            }
        }
        Ok(processed)
    }
}
