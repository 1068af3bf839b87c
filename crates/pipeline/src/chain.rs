//! Sequential prompt chains over one photo.
//!
//! Step *i+1* consumes the first image produced by step *i*, or the photo
//! itself when the request is [`ChainRequest::from_original`]. A failing
//! step is recorded and the chain moves on, unless the step is
//! `Sequential`, in which case every remaining step is left unattempted.
//! Each attempt is logged as an execution record when the runner has a
//! record store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use heirloom_airtable::records::{ExecutionRecord, PromptRecord};
use heirloom_airtable::RecordStore;
use heirloom_core::prompt::{render_template, requires_image_only, GenerationParams, WorkflowType};
use heirloom_core::restoration::PromptCategory;
use heirloom_core::types::Timestamp;
use heirloom_events::{event_types, EventBus, JobEvent};
use heirloom_gemini::{GenerationOutput, GenerationRequest, ImageGenerator, InputImage};
use serde::Serialize;
use serde_json::json;

use crate::codec::normalize;
use crate::error::PipelineError;
use crate::fetch::ImageFetcher;
use crate::storage::{step_key, ResultStore, SidecarEntry};

/// Used for any parameter a prompt does not set.
pub fn default_chain_params() -> GenerationParams {
    GenerationParams {
        model: None,
        temperature: Some(0.7),
        top_p: Some(0.95),
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One prompt of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub prompt_id: String,
    pub name: String,
    pub slug: String,
    /// Empty means "use the category step prompt".
    pub template: String,
    pub use_case: String,
    pub workflow_type: WorkflowType,
    pub execution_priority: i64,
    pub params: GenerationParams,
}

impl From<PromptRecord> for ChainStep {
    fn from(prompt: PromptRecord) -> Self {
        Self {
            prompt_id: prompt.id,
            name: prompt.name,
            slug: prompt.slug,
            template: prompt.template,
            use_case: prompt.use_case,
            workflow_type: prompt.workflow_type,
            execution_priority: prompt.execution_priority,
            params: prompt.params,
        }
    }
}

/// A chain to run against one photo.
#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub photo_id: String,
    pub photo_name: String,
    pub input_url: String,
    pub steps: Vec<ChainStep>,
    /// Extra template variables on top of `photo_name`, `photo_id`, `step`
    /// and `total_steps`.
    pub variables: HashMap<String, String>,
    pub workflow_run_id: Option<String>,
    /// Applies one workflow type to every step instead of each step's own.
    pub mode: Option<WorkflowType>,
    /// Every step reads the photo instead of the previous step's output.
    pub from_original: bool,
}

impl ChainRequest {
    pub fn new(
        photo_id: impl Into<String>,
        photo_name: impl Into<String>,
        input_url: impl Into<String>,
        steps: Vec<ChainStep>,
    ) -> Self {
        Self {
            photo_id: photo_id.into(),
            photo_name: photo_name.into(),
            input_url: input_url.into(),
            steps,
            variables: HashMap::new(),
            workflow_run_id: None,
            mode: None,
            from_original: false,
        }
    }

    pub fn from_original(mut self) -> Self {
        self.from_original = true;
        self
    }

    pub fn with_mode(mut self, mode: WorkflowType) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_workflow_run(mut self, run_id: impl Into<String>) -> Self {
        self.workflow_run_id = Some(run_id.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    NotAttempted,
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// 1-based position in the chain.
    pub step: usize,
    pub prompt_id: String,
    pub prompt_name: String,
    pub slug: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub execution_time: f64,
    pub input_url: Option<String>,
    /// Every image the step produced; only the first feeds the next step.
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    fn pending(step: usize, entry: &ChainStep) -> Self {
        Self {
            step,
            prompt_id: entry.prompt_id.clone(),
            prompt_name: entry.name.clone(),
            slug: entry.slug.clone(),
            status: StepStatus::NotAttempted,
            run_id: None,
            model: None,
            execution_time: 0.0,
            input_url: None,
            outputs: Vec::new(),
            text: None,
            error: None,
        }
    }
}

/// Per-step record of a whole chain run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainResult {
    pub photo_id: String,
    pub photo_name: String,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    pub steps: Vec<StepResult>,
    /// First output of the last successful step that produced one.
    pub final_output: Option<String>,
}

impl ChainResult {
    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn not_attempted(&self) -> usize {
        self.count(StepStatus::NotAttempted)
    }

    pub fn attempted(&self) -> usize {
        self.steps.len() - self.not_attempted()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Image the next step will consume.
struct StepInput {
    url: String,
    /// Already in hand when produced by the previous step.
    bytes: Option<Vec<u8>>,
}

/// Where execution records go.
struct ExecutionLog {
    records: Arc<dyn RecordStore>,
    table: String,
}

/// Runs prompt chains and logs every attempt.
pub struct PromptChainRunner {
    fetcher: Arc<dyn ImageFetcher>,
    generator: Arc<dyn ImageGenerator>,
    results: Arc<dyn ResultStore>,
    execution_log: Option<ExecutionLog>,
    events: Arc<EventBus>,
}

impl PromptChainRunner {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        generator: Arc<dyn ImageGenerator>,
        results: Arc<dyn ResultStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            fetcher,
            generator,
            results,
            execution_log: None,
            events,
        }
    }

    /// Log every attempt as a record in `table`. Local folder runs go
    /// without one.
    pub fn with_execution_log(
        mut self,
        records: Arc<dyn RecordStore>,
        table: impl Into<String>,
    ) -> Self {
        self.execution_log = Some(ExecutionLog {
            records,
            table: table.into(),
        });
        self
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    /// Execute `request.steps` strictly in order.
    pub async fn run(&self, request: ChainRequest) -> ChainResult {
        let total = request.steps.len();
        let mut steps: Vec<StepResult> = request
            .steps
            .iter()
            .enumerate()
            .map(|(i, entry)| StepResult::pending(i + 1, entry))
            .collect();
        let mut sidecar: BTreeMap<String, SidecarEntry> = BTreeMap::new();
        let mut input = StepInput {
            url: request.input_url.clone(),
            bytes: None,
        };
        let mut final_output = None;

        tracing::info!(
            photo_id = %request.photo_id,
            steps = total,
            workflow_run_id = request.workflow_run_id.as_deref().unwrap_or("-"),
            "Prompt chain started",
        );

        for (index, entry) in request.steps.iter().enumerate() {
            let step = index + 1;
            let prompt = self.prompt_text(&request, entry, step, total);
            let started = Instant::now();
            let attempt = self.attempt(&request, entry, step, &prompt, &mut input).await;
            let elapsed = started.elapsed().as_secs_f64();

            let result = &mut steps[index];
            result.run_id = Some(step_run_id(step));
            result.execution_time = elapsed;
            result.input_url = Some(input.url.clone());
            match attempt {
                Ok(done) => {
                    result.status = StepStatus::Succeeded;
                    result.model = Some(done.model);
                    result.text = done.text;
                    result.outputs = done.outputs;
                    if let Some(next) = done.next_input {
                        final_output = Some(next.url.clone());
                        if !request.from_original {
                            input = next;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        photo_id = %request.photo_id,
                        step,
                        prompt_id = %entry.prompt_id,
                        error = %e,
                        "Chain step failed",
                    );
                    result.status = StepStatus::Failed;
                    result.model = Some(self.model_for(entry));
                    result.error = Some(e.to_string());
                }
            }

            sidecar
                .entry(step_key(step, &entry.slug))
                .or_insert_with(|| SidecarEntry {
                    prompt: prompt.clone(),
                    files: Vec::new(),
                })
                .files
                .extend(result.outputs.iter().cloned());

            let result = result.clone();
            self.log_execution(&request, total, &result).await;
            self.events.publish(
                JobEvent::new(event_types::CHAIN_STEP_FINISHED)
                    .with_record(Some(&request.photo_id))
                    .with_payload(json!({
                        "step": step,
                        "prompt_id": result.prompt_id,
                        "status": result.status,
                        "outputs": result.outputs,
                    })),
            );

            let mode = request.mode.unwrap_or(entry.workflow_type);
            if result.status == StepStatus::Failed && mode.stops_on_failure() {
                tracing::info!(
                    photo_id = %request.photo_id,
                    step,
                    remaining = total - step,
                    "Sequential step failed, stopping chain",
                );
                break;
            }
        }

        let chain = ChainResult {
            photo_id: request.photo_id.clone(),
            photo_name: request.photo_name.clone(),
            timestamp: Utc::now(),
            workflow_run_id: request.workflow_run_id.clone(),
            steps,
            final_output,
        };

        let summary = serde_json::to_value(&chain).unwrap_or_default();
        if let Err(e) = self
            .results
            .write_sidecar(&request.photo_id, sidecar, summary)
            .await
        {
            tracing::warn!(photo_id = %request.photo_id, error = %e, "Failed to write sidecar");
        }

        tracing::info!(
            photo_id = %chain.photo_id,
            succeeded = chain.succeeded(),
            failed = chain.failed(),
            not_attempted = chain.not_attempted(),
            "Prompt chain finished",
        );
        self.events.publish(
            JobEvent::new(event_types::CHAIN_FINISHED)
                .with_record(Some(&chain.photo_id))
                .with_payload(json!({
                    "succeeded": chain.succeeded(),
                    "failed": chain.failed(),
                    "not_attempted": chain.not_attempted(),
                    "final_output": chain.final_output,
                })),
        );
        chain
    }

    fn prompt_text(&self, request: &ChainRequest, entry: &ChainStep, step: usize, total: usize) -> String {
        if entry.template.trim().is_empty() {
            return PromptCategory::from_label(&entry.use_case)
                .step_prompt(step)
                .to_string();
        }
        let mut vars = request.variables.clone();
        vars.insert("photo_name".into(), request.photo_name.clone());
        vars.insert("photo_id".into(), request.photo_id.clone());
        vars.insert("step".into(), step.to_string());
        vars.insert("total_steps".into(), total.to_string());
        render_template(&entry.template, &vars)
    }

    fn params_for(&self, entry: &ChainStep) -> GenerationParams {
        entry.params.clone().or(&default_chain_params()).capped()
    }

    fn model_for(&self, entry: &ChainStep) -> String {
        entry.params
            .model
            .clone()
            .unwrap_or_else(|| self.generator.default_model().to_string())
    }

    async fn attempt(
        &self,
        request: &ChainRequest,
        entry: &ChainStep,
        step: usize,
        prompt: &str,
        input: &mut StepInput,
    ) -> Result<StepSuccess, PipelineError> {
        let source = match input.bytes.take() {
            Some(bytes) => bytes,
            None => self.fetcher.fetch(&input.url).await?,
        };
        let normalized = normalize(&source);
        // A failed step leaves this input in place for the next one.
        input.bytes = Some(source);
        let normalized = normalized?;

        let generation = GenerationRequest::new(InputImage::png(normalized), prompt)
            .with_params(self.params_for(entry))
            .image_only(requires_image_only(&entry.use_case));
        let output: GenerationOutput = self.generator.generate(generation).await?;

        let mut outputs = Vec::with_capacity(output.images.len());
        for (i, image) in output.images.iter().enumerate() {
            let asset = self
                .results
                .save_chain_output(&request.photo_id, step, &entry.slug, i + 1, image)
                .await?;
            outputs.push(asset.url);
        }

        let next_input = match (output.images.first(), outputs.first()) {
            (Some(image), Some(url)) => Some(StepInput {
                url: url.clone(),
                bytes: Some(image.bytes.clone()),
            }),
            _ => {
                tracing::info!(
                    photo_id = %request.photo_id,
                    step,
                    "Step returned no image, next step reuses the current input",
                );
                None
            }
        };

        Ok(StepSuccess {
            model: output.model,
            text: output.text,
            outputs,
            next_input,
        })
    }

    /// Best-effort write of the immutable execution record.
    async fn log_execution(&self, request: &ChainRequest, total: usize, result: &StepResult) {
        let Some(log) = &self.execution_log else {
            return;
        };
        let success = result.status == StepStatus::Succeeded;
        let record = ExecutionRecord {
            run_id: result.run_id.clone().unwrap_or_default(),
            prompt_id: result.prompt_id.clone(),
            tested_at: Utc::now(),
            model: result.model.clone().unwrap_or_default(),
            execution_seconds: result.execution_time,
            success,
            notes: ExecutionRecord::notes_for(
                result.step,
                total,
                success,
                result.error.as_deref(),
                request.workflow_run_id.as_deref(),
            ),
            input_url: result.input_url.clone(),
            output_url: result.outputs.first().cloned(),
        };

        if let Err(e) = log
            .records
            .create(&log.table, record.to_fields())
            .await
        {
            tracing::warn!(
                photo_id = %request.photo_id,
                step = result.step,
                error = %e,
                "Failed to log execution record",
            );
        }
    }
}

struct StepSuccess {
    model: String,
    text: Option<String>,
    outputs: Vec<String>,
    next_input: Option<StepInput>,
}

/// `step<n>_<6 hex>_<HHMMSS>`
pub fn step_run_id(step: usize) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("step{step}_{}_{}", &hex[..6], Utc::now().format("%H%M%S"))
}

/// `wf_<8 hex>_<YYYYmmdd_HHMMSS>`
pub fn workflow_run_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("wf_{}_{}", &hex[..8], Utc::now().format("%Y%m%d_%H%M%S"))
}
