//! Handler for record-store webhooks.
//!
//! The signature is checked over the raw body before anything is parsed.
//! Events that cannot be acted on are acknowledged with 200 and an inline
//! `error` so the record store does not retry them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use heirloom_core::error::CoreError;
use heirloom_db::Job;
use heirloom_pipeline::{IntakeOutcome, PipelineError, WebhookPayload};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_json;
use crate::state::AppState;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-airtable-signature";

/// POST /api/v1/webhook
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    if state.verifier.is_permissive() {
        tracing::warn!("Webhook secret not configured, accepting unsigned request");
    }
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.verifier.verify(&body, signature) {
        tracing::warn!(error = %e, "Rejected webhook");
        return Err(AppError::Core(CoreError::Unauthorized(
            "Invalid signature".into(),
        )));
    }

    let payload: WebhookPayload = parse_json(&body)?;
    tracing::info!(
        event_type = %payload.event_type,
        record_id = payload.record_id.as_deref().unwrap_or("-"),
        table = payload.table_name.as_deref().unwrap_or("-"),
        "Webhook received",
    );

    match state.intake.handle(&payload).await {
        Ok(outcome) => Ok(Json(outcome_response(outcome))),
        Err(e @ PipelineError::Validation(_)) => Err(e.into()),
        Err(e) => {
            tracing::error!(
                record_id = payload.record_id.as_deref().unwrap_or("-"),
                error = %e,
                "Webhook processing failed",
            );
            Ok(Json(json!({ "success": false, "error": e.to_string() })))
        }
    }
}

fn outcome_response(outcome: IntakeOutcome) -> Value {
    match outcome {
        IntakeOutcome::Created { record_id, jobs } => json!({
            "success": true,
            "record_id": record_id,
            "jobs_created": jobs.len(),
            "results": jobs.iter().map(job_summary).collect::<Vec<_>>(),
        }),
        IntakeOutcome::Reprocessed {
            record_id,
            cancelled,
            jobs,
        } => json!({
            "success": true,
            "message": "Reprocessing started",
            "record_id": record_id,
            "jobs_cancelled": cancelled.len(),
            "jobs_created": jobs.len(),
        }),
        IntakeOutcome::NoAction => json!({ "message": "No action required" }),
        IntakeOutcome::Rejected { error } => json!({ "success": false, "error": error }),
    }
}

fn job_summary(job: &Job) -> Value {
    json!({
        "job_id": job.job_id,
        "status": job.status,
        "filename": job.filename,
        "priority": job.priority,
    })
}
