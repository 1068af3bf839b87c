//! PostgreSQL-backed job store over the `restoration_jobs` table.

use async_trait::async_trait;
use heirloom_core::batch::StatusBreakdown;
use heirloom_core::job_status::JobStatus;
use heirloom_core::types::Timestamp;
use sqlx::{FromRow, PgPool};

use crate::error::DbError;
use crate::models::{Job, JobPriority, JobResult};
use crate::store::{predecessors, JobStore};

/// Column list for `restoration_jobs` queries.
const COLUMNS: &str = "\
    job_id, batch_id, originating_record_id, status, priority, \
    image_url, filename, restoration_type, restoration_directive, \
    metadata, result, created_at, updated_at";

/// Raw row as stored; converted into [`Job`] at the boundary.
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub batch_id: Option<String>,
    pub originating_record_id: Option<String>,
    pub status: String,
    pub priority: String,
    pub image_url: String,
    pub filename: Option<String>,
    pub restoration_type: String,
    pub restoration_directive: String,
    pub metadata: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| DbError::Decode(format!("job {}: {e}", row.job_id)))?;
        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(DbError::Decode(format!(
                    "job {}: metadata is not an object: {other}",
                    row.job_id
                )))
            }
        };
        let result = row
            .result
            .map(serde_json::from_value::<JobResult>)
            .transpose()
            .map_err(|e| DbError::Decode(format!("job {}: result: {e}", row.job_id)))?;

        Ok(Job {
            job_id: row.job_id,
            batch_id: row.batch_id,
            originating_record_id: row.originating_record_id,
            status,
            priority: JobPriority::parse(&row.priority),
            image_url: row.image_url,
            filename: row.filename,
            restoration_type: row.restoration_type,
            restoration_directive: row.restoration_directive,
            metadata,
            result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, DbError> {
    rows.into_iter().map(Job::try_from).collect()
}

fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// `JobStore` over a shared PostgreSQL pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_where(&self, condition: &str, bind: &str) -> Result<Vec<Job>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM restoration_jobs WHERE {condition} ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?;
        into_jobs(rows)
    }

    /// Distinguish "missing" from "wrong state" after a guarded update
    /// matched no row.
    async fn rejected(&self, job_id: &str, to: JobStatus) -> DbError {
        match self.get(job_id).await {
            Ok(Some(job)) => DbError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to,
            },
            Ok(None) => DbError::NotFound(job_id.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn add(&self, job: &Job) -> Result<(), DbError> {
        let result = sqlx::query(
            "INSERT INTO restoration_jobs \
                 (job_id, batch_id, originating_record_id, status, priority, image_url, \
                  filename, restoration_type, restoration_directive, metadata, result, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(&job.job_id)
        .bind(&job.batch_id)
        .bind(&job.originating_record_id)
        .bind(job.status.as_str())
        .bind(job.priority.as_str())
        .bind(&job.image_url)
        .bind(&job.filename)
        .bind(&job.restoration_type)
        .bind(&job.restoration_directive)
        .bind(serde_json::Value::Object(job.metadata.clone()))
        .bind(
            job.result
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| DbError::Decode(e.to_string()))?,
        )
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Duplicate(job.job_id.clone()));
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM restoration_jobs WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn claim(&self, job_id: &str) -> Result<Option<Job>, DbError> {
        let query = format!(
            "UPDATE restoration_jobs \
             SET status = $2, updated_at = NOW() \
             WHERE job_id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(JobStatus::Processing.as_str())
            .bind(JobStatus::Queued.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<Job, DbError> {
        let result = result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DbError::Decode(e.to_string()))?;

        let query = format!(
            "UPDATE restoration_jobs \
             SET status = $2, result = COALESCE($3, result), updated_at = NOW() \
             WHERE job_id = $1 AND status = ANY($4) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(status.as_str())
            .bind(result)
            .bind(status_names(&predecessors(status)))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.rejected(job_id, status).await),
        }
    }

    async fn requeue(&self, job_id: &str) -> Result<Job, DbError> {
        let terminal: Vec<JobStatus> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        let query = format!(
            "UPDATE restoration_jobs \
             SET status = $2, result = NULL, updated_at = NOW() \
             WHERE job_id = $1 AND status = ANY($3) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(JobStatus::Queued.as_str())
            .bind(status_names(&terminal))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.rejected(job_id, JobStatus::Queued).await),
        }
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Job>, DbError> {
        self.fetch_where("batch_id = $1", batch_id).await
    }

    async fn list_since(&self, since: Timestamp) -> Result<Vec<Job>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM restoration_jobs WHERE created_at >= $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        into_jobs(rows)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DbError> {
        self.fetch_where("status = $1", status.as_str()).await
    }

    async fn list_by_record(&self, record_id: &str) -> Result<Vec<Job>, DbError> {
        self.fetch_where("originating_record_id = $1", record_id).await
    }

    async fn next_queued(&self, limit: usize) -> Result<Vec<Job>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM restoration_jobs \
             WHERE status = $1 \
             ORDER BY (priority = 'high') DESC, created_at ASC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Queued.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        into_jobs(rows)
    }

    async fn cancel_for_record(&self, record_id: &str) -> Result<Vec<String>, DbError> {
        let ids = sqlx::query_scalar::<_, String>(
            "UPDATE restoration_jobs \
             SET status = $2, updated_at = NOW() \
             WHERE originating_record_id = $1 AND status = ANY($3) \
             RETURNING job_id",
        )
        .bind(record_id)
        .bind(JobStatus::Cancelled.as_str())
        .bind(status_names(&predecessors(JobStatus::Cancelled)))
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(record_id, cancelled = ids.len(), "Cancelled jobs for record");
        Ok(ids)
    }

    async fn status_counts(&self) -> Result<StatusBreakdown, DbError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM restoration_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut breakdown = StatusBreakdown::default();
        for (status, count) in rows {
            let status = status
                .parse::<JobStatus>()
                .map_err(|e| DbError::Decode(e.to_string()))?;
            breakdown.add(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn row(status: &str, result: Option<serde_json::Value>) -> JobRow {
        let now = Utc::now();
        JobRow {
            job_id: "job-1".into(),
            batch_id: Some("batch-1".into()),
            originating_record_id: None,
            status: status.into(),
            priority: "high".into(),
            image_url: "https://example.com/a.jpg".into(),
            filename: None,
            restoration_type: "standard".into(),
            restoration_directive: "Restore.".into(),
            metadata: serde_json::json!({ "source": "api" }),
            result,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_decodes_into_job() {
        let job = Job::try_from(row(
            "completed",
            Some(serde_json::json!({
                "result_url": "https://cdn/x.png",
                "completed_at": "2025-01-01T00:00:00Z"
            })),
        ))
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.result_url(), Some("https://cdn/x.png"));
        assert_eq!(job.metadata["source"], "api");
    }

    #[test]
    fn unknown_status_is_decode_error() {
        assert_matches!(Job::try_from(row("done", None)), Err(DbError::Decode(_)));
    }

    #[test]
    fn non_object_metadata_is_decode_error() {
        let mut bad = row("queued", None);
        bad.metadata = serde_json::json!([1, 2]);
        assert_matches!(Job::try_from(bad), Err(DbError::Decode(_)));
    }

    #[test]
    fn columns_match_row_fields() {
        let names: Vec<&str> = COLUMNS.split(',').map(str::trim).collect();
        assert_eq!(names.len(), 13);
        assert_eq!(names.first(), Some(&"job_id"));
        assert_eq!(names.last(), Some(&"updated_at"));
    }
}
