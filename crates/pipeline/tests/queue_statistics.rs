//! Queue-wide statistics and record-store sampling.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{fields, Harness};
use heirloom_airtable::Record;
use heirloom_core::job_status::JobStatus;
use heirloom_db::{Job, JobResult, JobStore, NewJob};
use heirloom_pipeline::reporter::JobLookup;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: the 24-hour window includes 23h59m and excludes 24h01m
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recent_activity_window_is_24_hours() {
    let h = Harness::new();
    let now = Utc::now();
    for age in [Duration::minutes(23 * 60 + 59), Duration::minutes(24 * 60 + 1)] {
        let job = Job::new(NewJob::new("https://img/a.jpg", "standard").created_at(now - age));
        h.jobs.add(&job).await.unwrap();
    }

    let stats = h.reporter().queue_statistics_at(now).await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.status_breakdown.queued, 2);
    assert_eq!(stats.last_24_hours.total_jobs, 1);
    assert_eq!(stats.timestamp, now);
}

#[tokio::test]
async fn recent_activity_counts_terminal_states() {
    let h = Harness::new();
    let done = Job::new(NewJob::new("https://img/a.jpg", "standard"));
    let broken = Job::new(NewJob::new("https://img/b.jpg", "standard"));
    let running = Job::new(NewJob::new("https://img/c.jpg", "standard"));
    for job in [&done, &broken, &running] {
        h.jobs.add(job).await.unwrap();
        h.jobs.claim(&job.job_id).await.unwrap();
    }
    h.jobs
        .update_status(
            &done.job_id,
            JobStatus::Completed,
            Some(JobResult::completed("file:///x.png")),
        )
        .await
        .unwrap();
    h.jobs
        .update_status(&broken.job_id, JobStatus::Failed, Some(JobResult::failed("no")))
        .await
        .unwrap();

    let stats = h.reporter().queue_statistics().await.unwrap();
    assert_eq!(stats.last_24_hours.total_jobs, 3);
    assert_eq!(stats.last_24_hours.completed, 1);
    assert_eq!(stats.last_24_hours.failed, 1);
    assert_eq!(stats.last_24_hours.processing, 1);
    assert_eq!(stats.status_breakdown.total(), 3);
}

// ---------------------------------------------------------------------------
// Test: record-store statistics group by processing status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn airtable_stats_group_by_processing_status() {
    let h = Harness::new();
    for (id, status) in [
        ("rec1", Some("Completed")),
        ("rec2", Some("Completed")),
        ("rec3", Some("Failed")),
        ("rec4", None),
    ] {
        let body = match status {
            Some(s) => json!({ "Processing_Status": s }),
            None => json!({}),
        };
        h.records
            .insert(&h.tables.restorations, Record::new(id, fields(body)));
    }

    let stats = h.reporter().airtable_stats().await.unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.status_breakdown["Completed"], 2);
    assert_eq!(stats.status_breakdown["Failed"], 1);
    assert_eq!(stats.status_breakdown["Unknown"], 1);
}

#[tokio::test]
async fn job_statuses_report_unknown_ids_inline() {
    let h = Harness::new();
    let job = Job::new(NewJob::new("https://img/a.jpg", "standard"));
    h.jobs.add(&job).await.unwrap();

    let reports = h
        .reporter()
        .job_statuses(&[job.job_id.clone(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    let found = assert_matches!(&reports[0], JobLookup::Found(report) => report);
    assert_eq!(found.job_id, job.job_id);
    assert_eq!(found.status, JobStatus::Queued);
    assert_eq!(reports[1], JobLookup::missing("ghost"));
    assert_eq!(
        serde_json::to_value(&reports[1]).unwrap(),
        json!({ "error": "Job not found", "job_id": "ghost" })
    );
}
