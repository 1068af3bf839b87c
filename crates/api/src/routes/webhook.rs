//! Route definitions for the `/webhook` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::{health, method_not_allowed, webhook};
use crate::state::AppState;

/// Routes mounted at `/webhook`.
///
/// ```text
/// GET    /    -> webhook_health
/// POST   /    -> receive
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(health::webhook_health)
            .post(webhook::receive)
            .fallback(method_not_allowed),
    )
}
