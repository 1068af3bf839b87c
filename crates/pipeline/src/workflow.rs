//! Workflow runs over PhotoGallery records.

use std::sync::Arc;

use chrono::Utc;
use heirloom_airtable::formula;
use heirloom_airtable::records::{PhotoRecord, PhotoStatus, PhotoUpdate, PromptRecord, WorkflowRecord};
use heirloom_airtable::{ListQuery, RecordStore, TableNames};
use heirloom_core::prompt::{sort_by_priority, WorkflowType};
use heirloom_core::text::truncate_chars;
use serde::Serialize;

use crate::chain::{workflow_run_id, ChainRequest, ChainResult, ChainStep, PromptChainRunner, StepStatus};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// PromptCatalog
// ---------------------------------------------------------------------------

/// Typed reads over the Prompts, Workflows and PhotoGallery tables.
pub struct PromptCatalog {
    records: Arc<dyn RecordStore>,
    tables: TableNames,
}

impl PromptCatalog {
    pub fn new(records: Arc<dyn RecordStore>, tables: TableNames) -> Self {
        Self { records, tables }
    }

    /// Active prompts, optionally narrowed by use case and workflow type,
    /// in execution-priority order.
    pub async fn active_prompts(
        &self,
        use_case: Option<&str>,
        workflow_type: Option<WorkflowType>,
        limit: Option<usize>,
    ) -> Result<Vec<PromptRecord>, PipelineError> {
        let mut clauses = vec![formula::field_equals("Status", "Active")];
        if let Some(use_case) = use_case {
            clauses.push(formula::field_equals("Use Case", use_case));
        }
        if let Some(workflow_type) = workflow_type {
            clauses.push(formula::field_equals("Workflow Type", workflow_type.as_str()));
        }

        let query = ListQuery {
            filter_formula: formula::and(&clauses),
            ..ListQuery::default()
        };
        let records = self.records.list(&self.tables.prompts, &query).await?;
        let mut prompts = records
            .iter()
            .map(PromptRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_priority(&mut prompts, |p| p.execution_priority);
        if let Some(limit) = limit {
            prompts.truncate(limit);
        }
        Ok(prompts)
    }

    pub async fn photo(&self, photo_id: &str) -> Result<Option<PhotoRecord>, PipelineError> {
        match self.records.get(&self.tables.photos, photo_id).await? {
            Some(record) => Ok(Some(PhotoRecord::try_from(&record)?)),
            None => Ok(None),
        }
    }

    /// Photos that have at least one attachment.
    pub async fn photos_with_images(&self, limit: usize) -> Result<Vec<PhotoRecord>, PipelineError> {
        let query = ListQuery::filtered("NOT({Attachments} = '')").limit(limit);
        let records = self.records.list(&self.tables.photos, &query).await?;
        let photos = records
            .iter()
            .map(PhotoRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos.into_iter().filter(|p| !p.attachments.is_empty()).collect())
    }

    /// Prompts by id, in the given order. Missing ids are skipped.
    pub async fn prompts_by_id(&self, ids: &[String]) -> Result<Vec<PromptRecord>, PipelineError> {
        let mut prompts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.records.get(&self.tables.prompts, id).await? {
                Some(record) => prompts.push(PromptRecord::try_from(&record)?),
                None => tracing::warn!(prompt_id = %id, "Linked prompt not found, skipping"),
            }
        }
        Ok(prompts)
    }

    /// Resolve a photo's prompt list: its first linked workflow if any,
    /// otherwise its selected prompts. Sorted by execution priority.
    pub async fn workflow_prompts(
        &self,
        photo: &PhotoRecord,
    ) -> Result<(Option<WorkflowRecord>, Vec<PromptRecord>), PipelineError> {
        let workflow = match photo.workflow_ids.first() {
            Some(id) => match self.records.get(&self.tables.workflows, id).await? {
                Some(record) => Some(WorkflowRecord::try_from(&record)?),
                None => {
                    tracing::warn!(photo_id = %photo.id, workflow_id = %id, "Linked workflow not found");
                    None
                }
            },
            None => None,
        };

        let ids = match &workflow {
            Some(workflow) => &workflow.prompt_ids,
            None => &photo.selected_prompt_ids,
        };
        let mut prompts = self.prompts_by_id(ids).await?;
        sort_by_priority(&mut prompts, |p| p.execution_priority);
        Ok((workflow, prompts))
    }
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

/// Outcome of [`WorkflowRunner::run_for_photo`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub run_id: String,
    pub photo_id: String,
    pub workflow_name: Option<String>,
    #[serde(serialize_with = "serialize_photo_status")]
    pub status: PhotoStatus,
    pub chain: ChainResult,
}

fn serialize_photo_status<S: serde::Serializer>(
    status: &PhotoStatus,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.as_str())
}

/// Runs a photo's workflow and writes the outcome back to the photo.
pub struct WorkflowRunner {
    catalog: Arc<PromptCatalog>,
    chain: Arc<PromptChainRunner>,
    records: Arc<dyn RecordStore>,
    photos_table: String,
}

impl WorkflowRunner {
    pub fn new(
        catalog: Arc<PromptCatalog>,
        chain: Arc<PromptChainRunner>,
        records: Arc<dyn RecordStore>,
        photos_table: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            chain,
            records,
            photos_table: photos_table.into(),
        }
    }

    pub async fn run_for_photo(&self, photo_id: &str) -> Result<WorkflowRun, PipelineError> {
        let photo = self
            .catalog
            .photo(photo_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "Photo",
                id: photo_id.to_string(),
            })?;
        let input_url = photo
            .first_image_url()
            .ok_or_else(|| PipelineError::Validation(format!("Photo {photo_id} has no attachments")))?
            .to_string();

        let (workflow, prompts) = self.catalog.workflow_prompts(&photo).await?;
        if prompts.is_empty() {
            return Err(PipelineError::Validation(format!(
                "Photo {photo_id} has no workflow or selected prompts"
            )));
        }
        let workflow_name = workflow.map(|w| w.name);

        let run_id = workflow_run_id();
        tracing::info!(
            photo_id,
            %run_id,
            workflow = workflow_name.as_deref().unwrap_or("-"),
            steps = prompts.len(),
            "Workflow run started",
        );
        self.update_photo(photo_id, PhotoUpdate::processing(&run_id, Utc::now()))
            .await;

        let steps: Vec<ChainStep> = prompts.into_iter().map(ChainStep::from).collect();
        let request = ChainRequest::new(&photo.id, &photo.name, input_url, steps)
            .with_workflow_run(&run_id);
        let chain = self.chain.run(request).await;

        let status = PhotoStatus::from_counts(chain.succeeded(), chain.failed());
        let notes = summary_notes(workflow_name.as_deref(), &chain);
        self.update_photo(
            photo_id,
            PhotoUpdate::finished(
                status,
                chain.final_output.as_deref(),
                Some(&notes),
                chain.failed(),
                Utc::now(),
            ),
        )
        .await;

        tracing::info!(photo_id, %run_id, status = status.as_str(), "Workflow run finished");
        Ok(WorkflowRun {
            run_id,
            photo_id: photo_id.to_string(),
            workflow_name,
            status,
            chain,
        })
    }

    async fn update_photo(&self, photo_id: &str, fields: heirloom_airtable::Fields) {
        if let Err(e) = self.records.update(&self.photos_table, photo_id, fields).await {
            tracing::warn!(photo_id, error = %e, "Failed to update photo record");
        }
    }
}

/// Human summary stored in the photo's Notes field.
pub fn summary_notes(workflow_name: Option<&str>, chain: &ChainResult) -> String {
    let mut notes = format!(
        "Workflow: {}\nSteps completed: {}/{}\n",
        workflow_name.unwrap_or("Selected prompts"),
        chain.succeeded(),
        chain.steps.len()
    );
    for step in &chain.steps {
        let title = truncate_chars(&step.prompt_name, 30);
        match step.status {
            StepStatus::Succeeded => {
                notes.push_str(&format!("\nStep {}: {title}", step.step));
                if let Some(url) = step.outputs.first() {
                    notes.push_str(&format!("\n  URL: {url}"));
                }
            }
            StepStatus::Failed => {
                notes.push_str(&format!("\nStep {}: {title} (failed)", step.step));
            }
            StepStatus::NotAttempted => {
                notes.push_str(&format!("\nStep {}: {title} (not attempted)", step.step));
            }
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::chain::StepResult;

    fn step(n: usize, name: &str, status: StepStatus, output: Option<&str>) -> StepResult {
        StepResult {
            step: n,
            prompt_id: format!("p{n}"),
            prompt_name: name.into(),
            slug: format!("p{n}"),
            status,
            run_id: None,
            model: None,
            execution_time: 0.0,
            input_url: None,
            outputs: output.map(|o| vec![o.to_string()]).unwrap_or_default(),
            text: None,
            error: None,
        }
    }

    #[test]
    fn notes_list_every_step() {
        let chain = ChainResult {
            photo_id: "rec1".into(),
            photo_name: "Wedding".into(),
            timestamp: Utc::now(),
            workflow_run_id: None,
            steps: vec![
                step(1, "A very long restoration prompt title indeed", StepStatus::Succeeded, Some("file:///a.png")),
                step(2, "Colorize", StepStatus::Failed, None),
                step(3, "Upscale", StepStatus::NotAttempted, None),
            ],
            final_output: Some("file:///a.png".into()),
        };
        let notes = summary_notes(Some("Full restore"), &chain);
        assert!(notes.starts_with("Workflow: Full restore\nSteps completed: 1/3\n"));
        assert!(notes.contains("\nStep 1: A very long restoration prompt\n  URL: file:///a.png"));
        assert!(notes.contains("\nStep 2: Colorize (failed)"));
        assert!(notes.contains("\nStep 3: Upscale (not attempted)"));
    }
}
