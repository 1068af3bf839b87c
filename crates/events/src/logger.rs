//! Subscriber that mirrors every bus event into the tracing log.

use tokio::sync::broadcast;

use crate::bus::JobEvent;

/// Background service writing [`JobEvent`]s to `tracing`.
pub struct EventLogger;

impl EventLogger {
    /// Run until the bus is dropped. Returns the number of events logged.
    pub async fn run(mut receiver: broadcast::Receiver<JobEvent>) -> u64 {
        let mut logged = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::log(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
        logged
    }

    fn log(event: &JobEvent) {
        let job_id = event.job_id.as_deref().unwrap_or("-");
        let batch_id = event.batch_id.as_deref().unwrap_or("-");
        let record_id = event.record_id.as_deref().unwrap_or("-");
        if event.event_type.ends_with(".failed") {
            tracing::warn!(
                event_type = %event.event_type,
                job_id,
                batch_id,
                record_id,
                payload = %event.payload,
                "Job event"
            );
        } else {
            tracing::info!(
                event_type = %event.event_type,
                job_id,
                batch_id,
                record_id,
                payload = %event.payload,
                "Job event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{event_types, EventBus};

    #[tokio::test]
    async fn stops_when_bus_is_dropped() {
        let bus = EventBus::default();
        let handle = tokio::spawn(EventLogger::run(bus.subscribe()));

        bus.publish(JobEvent::new(event_types::JOB_QUEUED).with_job("a"));
        bus.publish(JobEvent::new(event_types::JOB_FAILED).with_job("a"));
        drop(bus);

        assert_eq!(handle.await.unwrap(), 2);
    }
}
