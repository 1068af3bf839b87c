//! Route definitions for the `/process` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::{health, method_not_allowed, process};
use crate::state::AppState;

/// Routes mounted at `/process`.
///
/// ```text
/// GET    /    -> process_health
/// POST   /    -> process
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(health::process_health)
            .post(process::process)
            .fallback(method_not_allowed),
    )
}
