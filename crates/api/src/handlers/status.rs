//! Handlers for the `/status` endpoint.
//!
//! Lookups that miss are answered with 200 and an inline `error` field so
//! pollers can tell "not yet known" apart from a broken request.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_json;
use crate::state::AppState;

/// Query parameters for `GET /status`. The first present key wins, in
/// declaration order.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub job_id: Option<String>,
    pub batch_id: Option<String>,
    /// `queue` (default) or `airtable`.
    pub stats: Option<String>,
}

/// Body of `POST /status`.
#[derive(Debug, Deserialize)]
pub struct JobIdsRequest {
    #[serde(default)]
    pub job_ids: Option<Vec<String>>,
}

/// GET /api/v1/status
pub async fn get_status(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> AppResult<Json<Value>> {
    if let Some(job_id) = params.job_id {
        let body = match state.reporter.job_status(&job_id).await? {
            Some(report) => serde_json::to_value(report),
            None => Ok(json!({ "error": "Job not found", "job_id": job_id })),
        };
        return to_json(body);
    }

    if let Some(batch_id) = params.batch_id {
        let body = match state.reporter.batch_status(&batch_id).await? {
            Some(report) => serde_json::to_value(report),
            None => Ok(json!({ "error": "Batch not found", "batch_id": batch_id })),
        };
        return to_json(body);
    }

    match params.stats.as_deref() {
        Some("airtable") => to_json(serde_json::to_value(
            state.reporter.airtable_stats().await?,
        )),
        _ => to_json(serde_json::to_value(
            state.reporter.queue_statistics().await?,
        )),
    }
}

/// POST /api/v1/status
///
/// Status of several jobs at once, in request order.
pub async fn post_status(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    let request: JobIdsRequest = parse_json(&body)?;
    let job_ids = request
        .job_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| AppError::BadRequest("job_ids array required".into()))?;

    let jobs = state.reporter.job_statuses(&job_ids).await?;
    Ok(Json(json!({
        "total": jobs.len(),
        "jobs": jobs,
    })))
}

fn to_json(value: serde_json::Result<Value>) -> AppResult<Json<Value>> {
    value
        .map(Json)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize status: {e}")))
}
