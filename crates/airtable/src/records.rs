//! Typed views over the records the toolchain reads and writes.
//!
//! Raw [`Record`] field maps never leave this module: readers convert them
//! into the structs below, writers build [`Fields`] through the update
//! helpers. Field names live here and nowhere else.

use heirloom_core::prompt::{
    requires_image_only, GenerationParams, WorkflowType, DEFAULT_EXECUTION_PRIORITY,
};
use heirloom_core::text::{slugify, truncate_chars};
use heirloom_core::types::Timestamp;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{Fields, Record};
use crate::error::RecordStoreError;

/// Airtable long-text limit applied to notes and error messages.
pub const FIELD_TEXT_LIMIT: usize = 2000;

/// Error excerpt length inside execution-record notes.
pub const NOTE_ERROR_EXCERPT: usize = 200;

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// One entry of an attachment field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

fn attachments(record: &Record, field: &str) -> Result<Vec<Attachment>, RecordStoreError> {
    match record.fields.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            RecordStoreError::Schema(format!("record {} field '{field}': {e}", record.id))
        }),
    }
}

fn fields(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Fields {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn timestamp(now: Timestamp) -> Value {
    Value::String(now.to_rfc3339())
}

// ---------------------------------------------------------------------------
// Restorations table
// ---------------------------------------------------------------------------

pub mod restoration_fields {
    pub const ORIGINAL_IMAGE: &str = "Original_Image";
    pub const RESTORATION_TYPE: &str = "Restoration_Type";
    pub const PROCESSING_PRIORITY: &str = "Processing_Priority";
    pub const REPROCESS_REQUEST: &str = "Reprocess_Request";
    pub const PROCESSING_STATUS: &str = "Processing_Status";
    pub const RESULT_URL: &str = "Result_URL";
    pub const LAST_UPDATED: &str = "Last_Updated";
    pub const ERROR_MESSAGE: &str = "Error_Message";

    /// Changes to any of these fields may trigger a reprocess.
    pub const WATCHED: [&str; 3] = [RESTORATION_TYPE, PROCESSING_PRIORITY, REPROCESS_REQUEST];
}

/// A row of the Restorations table.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorationRecord {
    pub id: String,
    pub original_images: Vec<Attachment>,
    pub restoration_type: String,
    pub processing_priority: String,
    pub reprocess_requested: bool,
    pub processing_status: Option<String>,
}

impl TryFrom<&Record> for RestorationRecord {
    type Error = RecordStoreError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        use restoration_fields::*;
        Ok(Self {
            id: record.id.clone(),
            original_images: attachments(record, ORIGINAL_IMAGE)?,
            restoration_type: record
                .str_field(RESTORATION_TYPE)
                .unwrap_or("standard")
                .to_string(),
            processing_priority: record
                .str_field(PROCESSING_PRIORITY)
                .unwrap_or("normal")
                .to_string(),
            reprocess_requested: record.bool_field(REPROCESS_REQUEST),
            processing_status: record.str_field(PROCESSING_STATUS).map(str::to_string),
        })
    }
}

/// Field updates written back to a Restorations row.
pub struct RestorationUpdate;

impl RestorationUpdate {
    pub const PROCESSING_STARTED: &'static str = "Processing Started";
    pub const REPROCESSING_STARTED: &'static str = "Reprocessing Started";
    pub const COMPLETED: &'static str = "Completed";
    pub const FAILED: &'static str = "Failed";

    pub fn processing_started(now: Timestamp) -> Fields {
        use restoration_fields::*;
        fields([
            (PROCESSING_STATUS, json!(Self::PROCESSING_STARTED)),
            (LAST_UPDATED, timestamp(now)),
        ])
    }

    /// Also clears the reprocess flag so the same request is not replayed.
    pub fn reprocessing_started(now: Timestamp) -> Fields {
        use restoration_fields::*;
        fields([
            (REPROCESS_REQUEST, json!(false)),
            (PROCESSING_STATUS, json!(Self::REPROCESSING_STARTED)),
            (LAST_UPDATED, timestamp(now)),
        ])
    }

    pub fn completed(result_url: &str, now: Timestamp) -> Fields {
        use restoration_fields::*;
        fields([
            (PROCESSING_STATUS, json!(Self::COMPLETED)),
            (RESULT_URL, json!(result_url)),
            (ERROR_MESSAGE, json!("")),
            (LAST_UPDATED, timestamp(now)),
        ])
    }

    pub fn failed(error: &str, now: Timestamp) -> Fields {
        use restoration_fields::*;
        fields([
            (PROCESSING_STATUS, json!(Self::FAILED)),
            (ERROR_MESSAGE, json!(truncate_chars(error, FIELD_TEXT_LIMIT))),
            (LAST_UPDATED, timestamp(now)),
        ])
    }
}

// ---------------------------------------------------------------------------
// PhotoGallery table
// ---------------------------------------------------------------------------

/// A row of the PhotoGallery table.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    pub name: String,
    pub attachments: Vec<Attachment>,
    pub notes: Option<String>,
    /// Linked Workflows rows; only the first is used.
    pub workflow_ids: Vec<String>,
    /// Linked Prompts rows used when no workflow is set.
    pub selected_prompt_ids: Vec<String>,
}

impl PhotoRecord {
    pub fn first_image_url(&self) -> Option<&str> {
        self.attachments.first().map(|a| a.url.as_str())
    }
}

impl TryFrom<&Record> for PhotoRecord {
    type Error = RecordStoreError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.clone(),
            name: record.str_field("Name").unwrap_or("Untitled").to_string(),
            attachments: attachments(record, "Attachments")?,
            notes: record.str_field("Notes").map(str::to_string),
            workflow_ids: record.string_list("Workflow"),
            selected_prompt_ids: record.string_list("Selected Prompt"),
        })
    }
}

/// Final state written to a photo after a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoStatus {
    Complete,
    Partial,
    Failed,
}

impl PhotoStatus {
    /// No failures is complete, no successes is failed, anything else partial.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            PhotoStatus::Complete
        } else if succeeded == 0 {
            PhotoStatus::Failed
        } else {
            PhotoStatus::Partial
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhotoStatus::Complete => "Complete",
            PhotoStatus::Partial => "Partial",
            PhotoStatus::Failed => "Failed",
        }
    }
}

/// Field updates written back to a PhotoGallery row.
pub struct PhotoUpdate;

impl PhotoUpdate {
    pub fn processing(run_id: &str, now: Timestamp) -> Fields {
        fields([
            ("Status", json!("Processing")),
            ("Processing Started", timestamp(now)),
            ("Processing Job ID", json!(run_id)),
        ])
    }

    pub fn finished(
        status: PhotoStatus,
        result_url: Option<&str>,
        notes: Option<&str>,
        failed_steps: usize,
        now: Timestamp,
    ) -> Fields {
        let mut out = fields([
            ("Status", json!(status.as_str())),
            ("Processing Completed", timestamp(now)),
        ]);
        if let Some(url) = result_url {
            out.insert("Result URL".into(), json!(url));
        }
        if let Some(notes) = notes {
            out.insert("Notes".into(), json!(truncate_chars(notes, FIELD_TEXT_LIMIT)));
        }
        if failed_steps > 0 {
            out.insert("Error Message".into(), json!(format!("{failed_steps} steps failed")));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Prompts table
// ---------------------------------------------------------------------------

/// A row of the Prompts table.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub id: String,
    pub name: String,
    /// May contain `{{variable}}` placeholders; empty means "use the
    /// category step prompt".
    pub template: String,
    pub use_case: String,
    pub params: GenerationParams,
    pub workflow_type: WorkflowType,
    pub execution_priority: i64,
    pub slug: String,
    pub tags: Vec<String>,
}

impl PromptRecord {
    pub fn requires_image_only(&self) -> bool {
        requires_image_only(&self.use_case)
    }
}

impl TryFrom<&Record> for PromptRecord {
    type Error = RecordStoreError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let name = record
            .str_field("Name")
            .or_else(|| record.str_field("Title"))
            .unwrap_or("Untitled")
            .to_string();
        let template = ["Prompt Template", "Prompt Content", "Prompt Text"]
            .iter()
            .find_map(|field| record.str_field(field))
            .unwrap_or_default()
            .to_string();
        let use_case = record
            .str_field("Use Case")
            .or_else(|| record.str_field("Category"))
            .unwrap_or_default()
            .to_string();
        let params = match record.fields.get("Model Config") {
            Some(Value::String(raw)) => GenerationParams::from_json_str(raw),
            Some(value) => GenerationParams::from_json(value),
            None => GenerationParams::default(),
        };
        // Slugs name output files, so a hand-typed one is normalised too.
        let slug = slugify(record.str_field("Slug").unwrap_or(&name));

        Ok(Self {
            id: record.id.clone(),
            template,
            use_case,
            params,
            workflow_type: record
                .str_field("Workflow Type")
                .map(WorkflowType::parse)
                .unwrap_or_default(),
            execution_priority: record
                .i64_field("Execution Priority")
                .unwrap_or(DEFAULT_EXECUTION_PRIORITY),
            slug,
            tags: record.string_list("Tags"),
            name,
        })
    }
}

// ---------------------------------------------------------------------------
// Workflows table
// ---------------------------------------------------------------------------

/// A row of the Workflows table: a named, ordered set of prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    pub prompt_ids: Vec<String>,
}

impl TryFrom<&Record> for WorkflowRecord {
    type Error = RecordStoreError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let mut prompt_ids = record.string_list("Prompts");
        if prompt_ids.is_empty() {
            prompt_ids = record.string_list("Steps");
        }
        Ok(Self {
            id: record.id.clone(),
            name: record
                .str_field("Workflow Name")
                .or_else(|| record.str_field("Name"))
                .unwrap_or("Unnamed workflow")
                .to_string(),
            prompt_ids,
        })
    }
}

// ---------------------------------------------------------------------------
// Test Runs table
// ---------------------------------------------------------------------------

/// Immutable log entry for one chain step attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub run_id: String,
    pub prompt_id: String,
    pub tested_at: Timestamp,
    pub model: String,
    pub execution_seconds: f64,
    pub success: bool,
    pub notes: String,
    pub input_url: Option<String>,
    pub output_url: Option<String>,
}

impl ExecutionRecord {
    /// `Step n/N - SUCCESS|FAILED`, an error excerpt and the workflow run id.
    pub fn notes_for(
        step: usize,
        total_steps: usize,
        success: bool,
        error: Option<&str>,
        workflow_run_id: Option<&str>,
    ) -> String {
        let mut notes = if success {
            format!("Step {step}/{total_steps} - SUCCESS")
        } else {
            format!(
                "Step {step}/{total_steps} - FAILED\n{}",
                truncate_chars(error.unwrap_or_default(), NOTE_ERROR_EXCERPT)
            )
        };
        if let Some(run_id) = workflow_run_id {
            notes.push_str(&format!("\nWorkflow: {run_id}"));
        }
        notes
    }

    pub fn to_fields(&self) -> Fields {
        let seconds = (self.execution_seconds * 100.0).round() / 100.0;
        let mut out = fields([
            ("Run ID", json!(self.run_id)),
            ("Prompt", json!([self.prompt_id])),
            ("Test Date", timestamp(self.tested_at)),
            ("Model Used", json!(self.model)),
            ("Execution Time (s)", json!(seconds)),
            ("Success", json!(self.success)),
            ("Notes", json!(truncate_chars(&self.notes, FIELD_TEXT_LIMIT))),
        ]);
        // Attachment fields only accept URLs Airtable can download.
        for (field, url) in [("Input Image", &self.input_url), ("Output Image", &self.output_url)] {
            if let Some(url) = url.as_deref().filter(|u| u.starts_with("http")) {
                out.insert(field.into(), json!([{ "url": url }]));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
