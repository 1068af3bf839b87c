use heirloom_core::job_status::JobStatus;

/// Errors raised by [`crate::JobStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Duplicate job id: {0}")]
    Duplicate(String),

    #[error("Corrupt job row: {0}")]
    Decode(String),
}
