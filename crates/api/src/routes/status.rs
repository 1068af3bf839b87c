//! Route definitions for the `/status` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::{method_not_allowed, status};
use crate::state::AppState;

/// Routes mounted at `/status`.
///
/// ```text
/// GET    /    -> get_status   (?job_id= | ?batch_id= | ?stats=queue|airtable)
/// POST   /    -> post_status  ({"job_ids": [...]})
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(status::get_status)
            .post(status::post_status)
            .fallback(method_not_allowed),
    )
}
