//! In-process job store used when no database is configured, and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use heirloom_core::batch::StatusBreakdown;
use heirloom_core::job_status::JobStatus;
use heirloom_core::types::Timestamp;
use tokio::sync::RwLock;

use crate::error::DbError;
use crate::models::{Job, JobPriority, JobResult};
use crate::store::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    /// Insertion order, used to break `created_at` ties.
    order: Vec<String>,
}

impl Inner {
    fn collect(&self, mut keep: impl FnMut(&Job) -> bool) -> Vec<Job> {
        let mut out: Vec<Job> = self
            .order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| keep(job))
            .cloned()
            .collect();
        out.sort_by_key(|job| job.created_at);
        out
    }
}

/// `JobStore` backed by a map behind an async lock. State is lost on exit.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn add(&self, job: &Job) -> Result<(), DbError> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.job_id) {
            return Err(DbError::Duplicate(job.job_id.clone()));
        }
        inner.order.push(job.job_id.clone());
        inner.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DbError> {
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn claim(&self, job_id: &str) -> Result<Option<Job>, DbError> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(job_id) {
            Some(job) if job.status == JobStatus::Queued => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<Job, DbError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DbError::NotFound(job_id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(DbError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: status,
            });
        }

        job.status = status;
        if result.is_some() {
            job.result = result;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn requeue(&self, job_id: &str) -> Result<Job, DbError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DbError::NotFound(job_id.to_string()))?;

        if !job.status.is_terminal() {
            return Err(DbError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Queued,
            });
        }

        job.status = JobStatus::Queued;
        job.result = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Job>, DbError> {
        let inner = self.inner.read().await;
        Ok(inner.collect(|job| job.batch_id.as_deref() == Some(batch_id)))
    }

    async fn list_since(&self, since: Timestamp) -> Result<Vec<Job>, DbError> {
        let inner = self.inner.read().await;
        Ok(inner.collect(|job| job.created_at >= since))
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DbError> {
        let inner = self.inner.read().await;
        Ok(inner.collect(|job| job.status == status))
    }

    async fn list_by_record(&self, record_id: &str) -> Result<Vec<Job>, DbError> {
        let inner = self.inner.read().await;
        Ok(inner.collect(|job| job.originating_record_id.as_deref() == Some(record_id)))
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<Job>, DbError> {
        let inner = self.inner.read().await;
        let mut queued = inner.collect(|job| job.status == JobStatus::Queued);
        // Stable: oldest-first order is kept within each priority.
        queued.sort_by_key(|job| job.priority != JobPriority::High);
        queued.truncate(limit);
        Ok(queued)
    }

    async fn cancel_for_record(&self, record_id: &str) -> Result<Vec<String>, DbError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut cancelled = Vec::new();
        let Inner { jobs, order } = &mut *inner;
        for id in order.iter() {
            let Some(job) = jobs.get_mut(id) else { continue };
            if job.originating_record_id.as_deref() == Some(record_id)
                && job.status.can_transition_to(JobStatus::Cancelled)
            {
                job.status = JobStatus::Cancelled;
                job.updated_at = now;
                cancelled.push(job.job_id.clone());
            }
        }
        Ok(cancelled)
    }

    async fn status_counts(&self) -> Result<StatusBreakdown, DbError> {
        let inner = self.inner.read().await;
        Ok(StatusBreakdown::from_statuses(
            inner.jobs.values().map(|job| job.status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration;

    use super::*;
    use crate::models::NewJob;

    fn job(url: &str) -> Job {
        Job::new(NewJob::new(url, "standard"))
    }

    #[tokio::test]
    async fn add_and_get() {
        let store = MemoryJobStore::new();
        let j = job("a");
        store.add(&j).await.unwrap();
        assert_eq!(store.get(&j.job_id).await.unwrap(), Some(j.clone()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_matches!(store.add(&j).await, Err(DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn claim_only_once() {
        let store = MemoryJobStore::new();
        let j = job("a");
        store.add(&j).await.unwrap();

        let claimed = store.claim(&j.job_id).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(store.claim(&j.job_id).await.unwrap().is_none());
        assert!(store.claim("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forward_transitions_are_enforced() {
        let store = MemoryJobStore::new();
        let j = job("a");
        store.add(&j).await.unwrap();

        assert_matches!(
            store
                .update_status(&j.job_id, JobStatus::Completed, None)
                .await,
            Err(DbError::InvalidTransition { from: JobStatus::Queued, to: JobStatus::Completed, .. })
        );

        store.claim(&j.job_id).await.unwrap();
        let done = store
            .update_status(&j.job_id, JobStatus::Completed, Some(JobResult::completed("u")))
            .await
            .unwrap();
        assert_eq!(done.result_url(), Some("u"));

        assert_matches!(
            store.update_status(&j.job_id, JobStatus::Failed, None).await,
            Err(DbError::InvalidTransition { .. })
        );
        assert_matches!(
            store.update_status("missing", JobStatus::Failed, None).await,
            Err(DbError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn requeue_resets_terminal_jobs_only() {
        let store = MemoryJobStore::new();
        let j = job("a");
        store.add(&j).await.unwrap();
        assert_matches!(store.requeue(&j.job_id).await, Err(DbError::InvalidTransition { .. }));

        store.claim(&j.job_id).await.unwrap();
        store
            .update_status(&j.job_id, JobStatus::Failed, Some(JobResult::failed("x")))
            .await
            .unwrap();
        let requeued = store.requeue(&j.job_id).await.unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.result.is_none());
    }

    #[tokio::test]
    async fn cancel_for_record_skips_terminal_jobs() {
        let store = MemoryJobStore::new();
        let queued = Job::new(NewJob::new("a", "standard").for_record("rec1"));
        let running = Job::new(NewJob::new("b", "standard").for_record("rec1"));
        let done = Job::new(NewJob::new("c", "standard").for_record("rec1"));
        let other = Job::new(NewJob::new("d", "standard").for_record("rec2"));
        for j in [&queued, &running, &done, &other] {
            store.add(j).await.unwrap();
        }
        store.claim(&running.job_id).await.unwrap();
        store.claim(&done.job_id).await.unwrap();
        store
            .update_status(&done.job_id, JobStatus::Completed, Some(JobResult::completed("u")))
            .await
            .unwrap();

        let cancelled = store.cancel_for_record("rec1").await.unwrap();
        assert_eq!(cancelled, vec![queued.job_id.clone(), running.job_id.clone()]);

        let statuses: Vec<_> = store
            .list_by_record("rec1")
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.status)
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Cancelled, JobStatus::Cancelled, JobStatus::Completed]
        );
        assert_eq!(store.get(&other.job_id).await.unwrap().unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn list_since_uses_created_at() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let old = Job::new(NewJob::new("old", "standard").created_at(now - Duration::hours(25)));
        let recent = Job::new(NewJob::new("new", "standard").created_at(now - Duration::hours(1)));
        store.add(&recent).await.unwrap();
        store.add(&old).await.unwrap();

        let since = store.list_since(now - Duration::hours(24)).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].image_url, "new");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn batch_listing_is_oldest_first() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let second = Job::new(NewJob::new("2", "standard").in_batch("b").created_at(now));
        let first = Job::new(
            NewJob::new("1", "standard")
                .in_batch("b")
                .created_at(now - Duration::seconds(5)),
        );
        store.add(&second).await.unwrap();
        store.add(&first).await.unwrap();
        store.add(&job("loose")).await.unwrap();

        let urls: Vec<_> = store
            .list_by_batch("b")
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.image_url)
            .collect();
        assert_eq!(urls, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn next_queued_prefers_high_priority() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let old_normal =
            Job::new(NewJob::new("n1", "standard").created_at(now - Duration::minutes(10)));
        let high = Job::new(
            NewJob::new("h", "standard")
                .with_priority(JobPriority::High)
                .created_at(now),
        );
        let new_normal = Job::new(NewJob::new("n2", "standard").created_at(now));
        for j in [&old_normal, &high, &new_normal] {
            store.add(j).await.unwrap();
        }

        let urls: Vec<_> = store
            .next_queued(2)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.image_url)
            .collect();
        assert_eq!(urls, vec!["h", "n1"]);
    }

    #[tokio::test]
    async fn status_counts_cover_all_jobs() {
        let store = MemoryJobStore::new();
        let a = job("a");
        let b = job("b");
        store.add(&a).await.unwrap();
        store.add(&b).await.unwrap();
        store.claim(&b.job_id).await.unwrap();

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 2);
    }
}
