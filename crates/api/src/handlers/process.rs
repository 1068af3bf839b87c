//! Handlers for the `/process` endpoint.
//!
//! A body with `image_url` restores one image inside the request; a body with
//! `images` persists a batch and returns as soon as it is scheduled.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use heirloom_core::job_status::JobStatus;
use heirloom_db::{Job, NewJob};
use heirloom_pipeline::BatchImage;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_json;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

/// Body of a single-image request.
#[derive(Debug, Deserialize)]
pub struct ProcessImageRequest {
    pub image_url: String,
    #[serde(default)]
    pub restoration_type: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Body of a batch request.
#[derive(Debug, Deserialize)]
pub struct ProcessBatchRequest {
    pub images: Vec<BatchImage>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/process
///
/// Dispatches on the body shape. Anything with neither `image_url` nor
/// `images` is rejected with 400.
pub async fn process(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    let value: Value = parse_json(&body)?;

    if value.get("image_url").is_some() {
        let request: ProcessImageRequest = from_value(value)?;
        process_single(&state, request).await
    } else if value.get("images").is_some() {
        let request: ProcessBatchRequest = from_value(value)?;
        process_batch(&state, request).await
    } else {
        Err(AppError::BadRequest("Invalid request format".into()))
    }
}

async fn process_single(state: &AppState, request: ProcessImageRequest) -> AppResult<Json<Value>> {
    if request.image_url.trim().is_empty() {
        return Err(AppError::BadRequest("image_url must not be empty".into()));
    }
    let restoration_type = request
        .restoration_type
        .unwrap_or_else(|| "standard".to_string());
    let input = NewJob::new(request.image_url, restoration_type).with_metadata(request.metadata);

    let job = state.pipeline.submit(input).await?;
    Ok(Json(single_response(&job)))
}

async fn process_batch(state: &AppState, request: ProcessBatchRequest) -> AppResult<Json<Value>> {
    let ticket = state.coordinator.create_batch(request.images).await?;
    let count = ticket.job_ids.len();

    Ok(Json(json!({
        "success": true,
        "batch_id": ticket.batch_id,
        "job_ids": ticket.job_ids,
        "message": format!("Batch processing started for {count} images"),
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| AppError::BadRequest(format!("Invalid request: {e}")))
}

/// Response for a job that went through the pipeline in-request.
fn single_response(job: &Job) -> Value {
    match job.status {
        JobStatus::Completed => json!({
            "success": true,
            "job_id": job.job_id,
            "result": {
                "status": "completed",
                "result_url": job.result_url(),
                "completed_at": job.completed_at(),
            },
        }),
        JobStatus::Cancelled => json!({
            "success": false,
            "job_id": job.job_id,
            "error": "Job was cancelled",
        }),
        _ => json!({
            "success": false,
            "job_id": job.job_id,
            "error": job.error().unwrap_or("Processing did not complete"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use heirloom_db::JobResult;

    use super::*;

    fn job() -> Job {
        Job::new(NewJob::new("https://img/a.jpg", "standard"))
    }

    #[test]
    fn completed_job_reports_result() {
        let mut job = job();
        job.status = JobStatus::Completed;
        job.result = Some(JobResult::completed("file:///out/a.png"));

        let body = single_response(&job);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["status"], "completed");
        assert_eq!(body["result"]["result_url"], "file:///out/a.png");
        assert!(body["result"]["completed_at"].is_string());
    }

    #[test]
    fn failed_job_reports_error() {
        let mut job = job();
        job.status = JobStatus::Failed;
        job.result = Some(JobResult::failed("No image returned by model m"));

        let body = single_response(&job);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No image returned by model m");
        assert!(body.get("result").is_none());
    }
}
