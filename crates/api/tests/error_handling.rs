//! Tests for `AppError` -> HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server is
//! needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use heirloom_api::error::AppError;
use heirloom_core::error::CoreError;
use heirloom_core::job_status::JobStatus;
use heirloom_db::DbError;
use heirloom_pipeline::PipelineError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: not-found errors map to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn core_not_found_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Batch",
        id: "b-1".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Batch with id b-1 not found");
}

#[tokio::test]
async fn pipeline_not_found_returns_404() {
    let err: AppError = PipelineError::NotFound {
        entity: "Photo",
        id: "recX".into(),
    }
    .into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Photo with id recX not found");
}

#[tokio::test]
async fn missing_job_in_store_returns_404() {
    let err: AppError = PipelineError::JobStore(DbError::NotFound("job-9".into())).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Job with id job-9 not found");
}

// ---------------------------------------------------------------------------
// Test: validation and bad requests map to 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err: AppError = PipelineError::Validation("images must not be empty".into()).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "images must not be empty");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("job_ids array required".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "job_ids array required");
}

// ---------------------------------------------------------------------------
// Test: signature failures map to 401
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthorized_returns_401() {
    let err = AppError::Core(CoreError::Unauthorized("Invalid signature".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
    assert_eq!(json["error"], "Invalid signature");
}

// ---------------------------------------------------------------------------
// Test: job store conflicts map to 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_transition_returns_409() {
    let err: AppError = PipelineError::JobStore(DbError::InvalidTransition {
        job_id: "job-1".into(),
        from: JobStatus::Completed,
        to: JobStatus::Processing,
    })
    .into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(
        json["error"],
        "Job job-1 cannot move from completed to processing"
    );
}

#[tokio::test]
async fn duplicate_job_returns_409() {
    let err: AppError = PipelineError::JobStore(DbError::Duplicate("job-2".into())).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Duplicate job id: job-2");
}

// ---------------------------------------------------------------------------
// Test: everything else is a sanitized 500
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret credentials leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn fetch_failure_is_sanitized() {
    let err: AppError = PipelineError::Fetch("https://user:pw@host/img.jpg: timeout".into()).into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!json["error"].as_str().unwrap().contains("pw@host"));
}

#[tokio::test]
async fn method_not_allowed_returns_405() {
    let (status, json) = error_to_response(AppError::MethodNotAllowed).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json["error"], "Method not allowed");
}
