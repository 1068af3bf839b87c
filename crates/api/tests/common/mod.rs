#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use heirloom_airtable::{Fields, ListQuery, Record, RecordStore, RecordStoreError, TableNames};
use heirloom_api::config::ServerConfig;
use heirloom_api::router::build_app_router;
use heirloom_api::state::AppState;
use heirloom_core::signature::WebhookVerifier;
use heirloom_db::MemoryJobStore;
use heirloom_events::EventBus;
use heirloom_gemini::{
    GeneratedImage, GenerationError, GenerationOutput, GenerationRequest, ImageGenerator,
};
use heirloom_pipeline::{
    BatchCoordinator, ImageFetcher, LocalResultStore, PipelineError, RecordIntake,
    RestorationPipeline, StatusReporter, StorageConfig,
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn tiny_png() -> Vec<u8> {
    let image = RgbImage::from_pixel(2, 2, Rgb([200, 180, 150]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Serves a tiny PNG for every URL except those containing `missing`.
#[derive(Default)]
pub struct FakeFetcher;

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        if url.contains("missing") {
            return Err(PipelineError::Fetch(format!("{url}: HTTP 404")));
        }
        Ok(tiny_png())
    }
}

/// Returns one image, or no image when the directive mentions `EMPTY`.
#[derive(Default)]
pub struct FakeGenerator;

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let images = if request.prompt.contains("EMPTY") {
            Vec::new()
        } else {
            vec![GeneratedImage {
                bytes: tiny_png(),
                mime_type: "image/png".into(),
            }]
        };
        Ok(GenerationOutput {
            images,
            text: None,
            model: "fake-model".into(),
        })
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}

/// In-memory record store; filter formulas are ignored.
#[derive(Default)]
pub struct FakeRecordStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
}

impl FakeRecordStore {
    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn record(&self, table: &str, id: &str) -> Option<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == id).cloned())
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, RecordStoreError> {
        let mut rows = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default();
        if let Some(max) = query.max_records {
            rows.truncate(max);
        }
        Ok(rows)
    }

    async fn get(&self, table: &str, record_id: &str) -> Result<Option<Record>, RecordStoreError> {
        Ok(self.record(table, record_id))
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, RecordStoreError> {
        let record = Record::new(format!("recNew{}", fields.len()), fields);
        self.insert(table, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<Record, RecordStoreError> {
        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| RecordStoreError::Api {
                status: 404,
                body: "NOT_FOUND".into(),
            })?;
        record.fields.extend(fields);
        Ok(record.clone())
    }
}

pub fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().expect("object")
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults and a webhook secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        database_url: None,
        dispatcher_enabled: false,
        dispatcher_poll_secs: 5,
    }
}

/// The router plus handles on the stores behind it.
pub struct TestApp {
    pub router: Router,
    pub jobs: Arc<MemoryJobStore>,
    pub records: Arc<FakeRecordStore>,
    pub coordinator: Arc<BatchCoordinator>,
    pub tables: TableNames,
    pub dir: TempDir,
}

impl TestApp {
    /// A fresh clone of the router, ready for `oneshot`.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Build the full application router over in-memory fakes.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let tables = TableNames::default();
    let jobs = Arc::new(MemoryJobStore::new());
    let records = Arc::new(FakeRecordStore::default());
    let events = Arc::new(EventBus::default());

    let pipeline = Arc::new(
        RestorationPipeline::new(
            jobs.clone(),
            Arc::new(FakeFetcher),
            Arc::new(FakeGenerator),
            Arc::new(LocalResultStore::new(StorageConfig::new(dir.path()))),
            Arc::clone(&events),
        )
        .with_record_store(records.clone(), tables.restorations.clone()),
    );
    let coordinator = Arc::new(BatchCoordinator::new(
        Arc::clone(&pipeline),
        Arc::clone(&events),
    ));
    let intake = Arc::new(RecordIntake::new(
        jobs.clone(),
        records.clone(),
        Arc::clone(&coordinator),
        Arc::clone(&events),
        tables.restorations.clone(),
    ));
    let reporter = Arc::new(
        StatusReporter::new(jobs.clone())
            .with_record_store(records.clone(), tables.restorations.clone()),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline,
        coordinator: Arc::clone(&coordinator),
        intake,
        reporter,
        verifier: Arc::new(WebhookVerifier::from_secret(config.webhook_secret.clone())),
        event_bus: events,
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        jobs,
        records,
        coordinator,
        tables,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(
        app,
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
