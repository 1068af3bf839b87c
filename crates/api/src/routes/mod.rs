pub mod health;
pub mod process;
pub mod status;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /process                 restore one image (POST image_url) or start a batch (POST images)
/// /status                  job, batch or queue status (GET), several jobs (POST)
/// /webhook                 record-store webhook (POST, signed)
/// ```
///
/// `GET /process` and `GET /webhook` describe the service; any other method
/// on these paths is answered with 405.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/process", process::router())
        .nest("/status", status::router())
        .nest("/webhook", webhook::router())
}
