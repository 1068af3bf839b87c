use std::sync::Arc;

use heirloom_core::signature::WebhookVerifier;
use heirloom_db::DbPool;
use heirloom_events::EventBus;
use heirloom_pipeline::{BatchCoordinator, RecordIntake, RestorationPipeline, StatusReporter};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Runs single jobs inside the request.
    pub pipeline: Arc<RestorationPipeline>,
    /// Schedules batches in the background.
    pub coordinator: Arc<BatchCoordinator>,
    /// Turns record-store webhooks into jobs.
    pub intake: Arc<RecordIntake>,
    pub reporter: Arc<StatusReporter>,
    /// Webhook signature check; permissive when no secret is configured.
    pub verifier: Arc<WebhookVerifier>,
    /// Job lifecycle events.
    pub event_bus: Arc<EventBus>,
    /// Database pool, present only when jobs are stored in PostgreSQL.
    pub pool: Option<DbPool>,
}
