//! Per-endpoint service descriptors returned on `GET`.

use axum::Json;
use serde::Serialize;

/// Identifies the service behind an endpoint.
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

impl ServiceHealth {
    fn healthy(service: &'static str) -> Json<Self> {
        Json(Self {
            service,
            version: env!("CARGO_PKG_VERSION"),
            status: "healthy",
        })
    }
}

/// GET /api/v1/process
pub async fn process_health() -> Json<ServiceHealth> {
    ServiceHealth::healthy("Image Restoration API")
}

/// GET /api/v1/webhook
pub async fn webhook_health() -> Json<ServiceHealth> {
    ServiceHealth::healthy("Airtable Webhook Handler")
}
