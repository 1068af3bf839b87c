#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use heirloom_airtable::{Fields, ListQuery, Record, RecordStore, RecordStoreError, TableNames};
use heirloom_db::MemoryJobStore;
use heirloom_events::EventBus;
use heirloom_gemini::{
    GeneratedImage, GenerationError, GenerationOutput, GenerationRequest, ImageGenerator,
};
use heirloom_pipeline::{
    BatchCoordinator, ImageFetcher, LocalResultStore, PipelineError, PromptChainRunner,
    RecordIntake, RestorationPipeline, StatusReporter, StorageConfig,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

pub const MODEL: &str = "fake-image-model";

/// A 2x2 opaque PNG.
pub fn tiny_png() -> Vec<u8> {
    let image = RgbImage::from_pixel(2, 2, Rgb([120, 90, 60]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------
// FakeFetcher
// ---------------------------------------------------------------------------

/// Serves [`tiny_png`] for every URL except those containing `missing`.
#[derive(Default)]
pub struct FakeFetcher {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if url.contains("missing") {
            return Err(PipelineError::Fetch(format!("{url}: HTTP 404")));
        }
        Ok(tiny_png())
    }
}

// ---------------------------------------------------------------------------
// FakeGenerator
// ---------------------------------------------------------------------------

/// Behaviour is keyed on the prompt text: `FAIL` errors, `EMPTY` returns no
/// image, `TWICE` returns two images, anything else one image.
pub struct FakeGenerator {
    pub calls: Mutex<Vec<GenerationRequest>>,
    /// Signalled whenever a call starts.
    pub entered: Arc<Notify>,
    /// When set, each call waits for a permit before answering.
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            entered: Arc::new(Notify::new()),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.prompt.clone())
            .collect()
    }

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: tiny_png(),
            mime_type: "image/png".into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let prompt = request.prompt.clone();
        self.calls.lock().unwrap().push(request);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if prompt.contains("FAIL") {
            return Err(GenerationError::Api {
                status: 500,
                body: "model exploded".into(),
            });
        }
        let images = if prompt.contains("EMPTY") {
            Vec::new()
        } else if prompt.contains("TWICE") {
            vec![Self::image(), Self::image()]
        } else {
            vec![Self::image()]
        };
        Ok(GenerationOutput {
            images,
            text: None,
            model: MODEL.into(),
        })
    }

    fn default_model(&self) -> &str {
        MODEL
    }
}

// ---------------------------------------------------------------------------
// FakeRecordStore
// ---------------------------------------------------------------------------

/// In-memory record store. Filter formulas are ignored; `max_records` is
/// honoured.
#[derive(Default)]
pub struct FakeRecordStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    pub created: Mutex<Vec<(String, Fields)>>,
    pub updates: Mutex<Vec<(String, String, Fields)>>,
    next_id: Mutex<usize>,
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

    pub fn set_field(&self, table: &str, id: &str, field: &str, value: serde_json::Value) {
        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            .expect("record exists");
        record.fields.insert(field.to_string(), value);
    }

    pub fn created_in(&self, table: &str) -> Vec<Fields> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn updates_for(&self, table: &str, id: &str) -> Vec<Fields> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, i, _)| t == table && i == id)
            .map(|(_, _, f)| f.clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, RecordStoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows = tables.get(table).cloned().unwrap_or_default();
        if let Some(max) = query.max_records {
            rows.truncate(max);
        }
        Ok(rows)
    }

    async fn get(&self, table: &str, record_id: &str) -> Result<Option<Record>, RecordStoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == record_id).cloned()))
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, RecordStoreError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("recNew{next}")
        };
        self.created
            .lock()
            .unwrap()
            .push((table.to_string(), fields.clone()));
        let record = Record::new(id, fields);
        self.insert(table, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<Record, RecordStoreError> {
        self.updates
            .lock()
            .unwrap()
            .push((table.to_string(), record_id.to_string(), fields.clone()));
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
// Harness
// ---------------------------------------------------------------------------

/// Every pipeline component wired to fakes and a temporary output directory.
pub struct Harness {
    pub jobs: Arc<MemoryJobStore>,
    pub records: Arc<FakeRecordStore>,
    pub generator: Arc<FakeGenerator>,
    pub fetcher: Arc<FakeFetcher>,
    pub events: Arc<EventBus>,
    pub results: Arc<LocalResultStore>,
    pub pipeline: Arc<RestorationPipeline>,
    pub coordinator: Arc<BatchCoordinator>,
    pub tables: TableNames,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_generator(FakeGenerator::new())
    }

    pub fn with_generator(generator: FakeGenerator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tables = TableNames::default();
        let jobs = Arc::new(MemoryJobStore::new());
        let records = Arc::new(FakeRecordStore::default());
        let generator = Arc::new(generator);
        let fetcher = Arc::new(FakeFetcher::default());
        let events = Arc::new(EventBus::default());
        let results = Arc::new(LocalResultStore::new(StorageConfig::new(dir.path())));

        let pipeline = Arc::new(
            RestorationPipeline::new(
                jobs.clone(),
                fetcher.clone(),
                generator.clone(),
                results.clone(),
                Arc::clone(&events),
            )
            .with_record_store(records.clone(), tables.restorations.clone()),
        );
        let coordinator = Arc::new(BatchCoordinator::new(
            Arc::clone(&pipeline),
            Arc::clone(&events),
        ));

        Self {
            jobs,
            records,
            generator,
            fetcher,
            events,
            results,
            pipeline,
            coordinator,
            tables,
            dir,
        }
    }

    pub fn chain_runner(&self) -> PromptChainRunner {
        PromptChainRunner::new(
            self.fetcher.clone(),
            self.generator.clone(),
            self.results.clone(),
            Arc::clone(&self.events),
        )
        .with_execution_log(self.records.clone(), self.tables.test_runs.clone())
    }

    pub fn intake(&self) -> RecordIntake {
        RecordIntake::new(
            self.jobs.clone(),
            self.records.clone(),
            Arc::clone(&self.coordinator),
            Arc::clone(&self.events),
            self.tables.restorations.clone(),
        )
    }

    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(self.jobs.clone())
            .with_record_store(self.records.clone(), self.tables.restorations.clone())
    }
}
