//! Integration tests for `/api/v1/status`.

mod common;

use axum::http::StatusCode;
use common::{body_json, fields, get, post_json};
use heirloom_airtable::Record;
use serde_json::json;

/// Restore one image through the API and return its job id.
async fn processed_job(test: &common::TestApp) -> String {
    let json = body_json(
        post_json(
            test.app(),
            "/api/v1/process",
            json!({ "image_url": "https://img/one.jpg" }),
        )
        .await,
    )
    .await;
    json["job_id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Test: job lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_status_reports_result() {
    let test = common::build_test_app();
    let job_id = processed_job(&test).await;

    let response = get(test.app(), &format!("/api/v1/status?job_id={job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["job_id"], job_id.as_str());
    assert_eq!(json["status"], "completed");
    assert_eq!(json["priority"], "normal");
    assert!(json["result_url"].is_string());
    assert!(json["completed_at"].is_string());
    assert!(json.get("error").is_none());
    assert!(json.get("batch_info").is_none());
}

#[tokio::test]
async fn unknown_job_is_reported_inline() {
    let test = common::build_test_app();
    let response = get(test.app(), "/api/v1/status?job_id=ghost").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Job not found", "job_id": "ghost" })
    );
}

// ---------------------------------------------------------------------------
// Test: batch aggregates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_status_aggregates_members() {
    let test = common::build_test_app();
    let ticket = body_json(
        post_json(
            test.app(),
            "/api/v1/process",
            json!({ "images": [
                { "image_url": "https://img/one.jpg" },
                { "image_url": "https://img/missing.jpg" }
            ] }),
        )
        .await,
    )
    .await;
    let batch_id = ticket["batch_id"].as_str().unwrap();
    test.coordinator.wait(batch_id).await.unwrap();

    let json = body_json(get(test.app(), &format!("/api/v1/status?batch_id={batch_id}")).await).await;
    assert_eq!(json["batch_id"], batch_id);
    assert_eq!(json["total_jobs"], 2);
    // Mixed terminal outcomes are neither completed nor failed.
    assert_eq!(json["overall_status"], "unknown");
    assert_eq!(json["progress_percentage"], 50.0);
    assert_eq!(json["status_breakdown"]["completed"], 1);
    assert_eq!(json["status_breakdown"]["failed"], 1);
    assert_eq!(json["jobs"].as_array().unwrap().len(), 2);

    // Member jobs carry the batch aggregate.
    let member = ticket["job_ids"][0].as_str().unwrap();
    let job = body_json(get(test.app(), &format!("/api/v1/status?job_id={member}")).await).await;
    assert_eq!(job["batch_info"]["batch_id"], batch_id);
}

#[tokio::test]
async fn unknown_batch_is_reported_inline() {
    let test = common::build_test_app();
    let json = body_json(get(test.app(), "/api/v1/status?batch_id=nope").await).await;

    assert_eq!(json, json!({ "error": "Batch not found", "batch_id": "nope" }));
}

// ---------------------------------------------------------------------------
// Test: statistics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_statistics_are_the_default() {
    let test = common::build_test_app();
    processed_job(&test).await;

    let json = body_json(get(test.app(), "/api/v1/status").await).await;
    assert_eq!(json["total_jobs"], 1);
    assert_eq!(json["status_breakdown"]["completed"], 1);
    assert_eq!(json["last_24_hours"]["total_jobs"], 1);
    assert_eq!(json["last_24_hours"]["completed"], 1);
    assert!(json["timestamp"].is_string());

    let explicit = body_json(get(test.app(), "/api/v1/status?stats=queue").await).await;
    assert_eq!(explicit["total_jobs"], 1);
}

#[tokio::test]
async fn airtable_statistics_group_records() {
    let test = common::build_test_app();
    for (id, status) in [("rec1", "Completed"), ("rec2", "Processing Started")] {
        test.records.insert(
            &test.tables.restorations,
            Record::new(id, fields(json!({ "Processing_Status": status }))),
        );
    }

    let json = body_json(get(test.app(), "/api/v1/status?stats=airtable").await).await;
    assert_eq!(json["total_records"], 2);
    assert_eq!(json["status_breakdown"]["Completed"], 1);
    assert_eq!(json["status_breakdown"]["Processing Started"], 1);
    assert!(json["last_sync"].is_string());
}

// ---------------------------------------------------------------------------
// Test: POST with several job ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn several_jobs_are_reported_in_order() {
    let test = common::build_test_app();
    let job_id = processed_job(&test).await;

    let response = post_json(
        test.app(),
        "/api/v1/status",
        json!({ "job_ids": ["ghost", job_id] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["jobs"][0], json!({ "error": "Job not found", "job_id": "ghost" }));
    assert_eq!(json["jobs"][1]["job_id"], job_id.as_str());
    assert_eq!(json["jobs"][1]["status"], "completed");
}

#[tokio::test]
async fn missing_job_ids_is_a_bad_request() {
    let test = common::build_test_app();
    for body in [json!({}), json!({ "job_ids": [] })] {
        let response = post_json(test.app(), "/api/v1/status", body).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "job_ids array required");
    }
}
