//! Request handlers.
//!
//! Each submodule serves one endpoint under `/api/v1`. Handlers delegate to
//! the pipeline components held in [`AppState`](crate::state::AppState) and
//! map errors via [`AppError`].

pub mod health;
pub mod process;
pub mod status;
pub mod webhook;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Fallback for methods an endpoint does not serve.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Parse a raw request body as JSON.
///
/// Handlers take the body as bytes so the webhook can verify signatures over
/// the exact payload and so malformed JSON maps to a 400 with our error shape.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}
