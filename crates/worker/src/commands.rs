//! Command execution. Each command returns how many photos had at least one
//! successful step; the caller turns zero into a failing exit code.

use std::sync::Arc;

use heirloom_airtable::records::{PhotoRecord, PromptRecord};
use heirloom_pipeline::local::{find_photos, folder_request, read_prompts};
use heirloom_pipeline::{
    ChainRequest, ChainResult, ChainStep, LocalResultStore, PipelineError, PromptCatalog,
    PromptChainRunner, ResultStore, WorkflowRunner,
};
use serde_json::json;

use crate::cli::{PromptsOptions, RestoreDirOptions};

/// Components shared by the record-backed commands.
pub struct Services {
    pub catalog: Arc<PromptCatalog>,
    pub chain: Arc<PromptChainRunner>,
    pub workflows: WorkflowRunner,
}

/// `workflow <photo-id>...`
pub async fn run_workflows(
    services: &Services,
    photo_ids: &[String],
    dry_run: bool,
) -> Result<usize, PipelineError> {
    let mut succeeded = 0;
    for photo_id in photo_ids {
        if dry_run {
            plan_workflow(services, photo_id).await?;
            continue;
        }

        match services.workflows.run_for_photo(photo_id).await {
            Ok(run) => {
                println!(
                    "{photo_id}: {} ({} ok, {} failed, {} skipped) run {}",
                    run.status.as_str(),
                    run.chain.succeeded(),
                    run.chain.failed(),
                    run.chain.not_attempted(),
                    run.run_id,
                );
                print_final_output(&run.chain);
                if run.chain.succeeded() > 0 {
                    succeeded += 1;
                }
            }
            Err(e) => {
                tracing::error!(photo_id = %photo_id, error = %e, "Workflow run failed");
                println!("{photo_id}: error: {e}");
            }
        }
    }
    Ok(succeeded)
}

async fn plan_workflow(services: &Services, photo_id: &str) -> Result<(), PipelineError> {
    let Some(photo) = services.catalog.photo(photo_id).await? else {
        println!("{photo_id}: not found");
        return Ok(());
    };
    let (workflow, prompts) = services.catalog.workflow_prompts(&photo).await?;
    println!(
        "{photo_id} ({}): {} via {}",
        photo.name,
        photo.first_image_url().unwrap_or("no attachment"),
        workflow
            .as_ref()
            .map(|w| w.name.as_str())
            .unwrap_or("selected prompts"),
    );
    print_prompts(&prompts);
    Ok(())
}

/// `prompts [...]`
pub async fn run_prompts(services: &Services, options: &PromptsOptions) -> Result<usize, PipelineError> {
    let prompts = services
        .catalog
        .active_prompts(
            options.use_case.as_deref(),
            Some(options.mode),
            options.prompt_limit,
        )
        .await?;
    let photos = services.catalog.photos_with_images(options.photo_limit).await?;

    println!("Mode: {}", options.mode.as_str());
    println!("Prompts found: {}", prompts.len());
    println!("Photos found: {}", photos.len());

    if options.dry_run {
        for photo in &photos {
            println!("{} ({})", photo.id, photo.name);
        }
        print_prompts(&prompts);
        return Ok(photos.len());
    }
    if prompts.is_empty() {
        tracing::warn!("No active prompts matched, nothing to run");
        return Ok(0);
    }

    let mut succeeded = 0;
    for photo in &photos {
        println!("\nProcessing: {}", photo.name);
        let chain = run_photo_chain(services, photo, &prompts, options).await;

        let summary = json!({
            "photo_id": photo.id,
            "photo_name": photo.name,
            "mode": options.mode,
            "use_case": options.use_case,
            "chain": chain,
        });
        match services.chain.results().save_run_summary(&photo.id, &summary).await {
            Ok(path) => println!("  Results saved: {}", path.display()),
            Err(e) => tracing::warn!(photo_id = %photo.id, error = %e, "Failed to save run summary"),
        }

        println!(
            "  {} ok, {} failed, {} skipped",
            chain.succeeded(),
            chain.failed(),
            chain.not_attempted()
        );
        print_final_output(&chain);
        if chain.succeeded() > 0 {
            succeeded += 1;
        }
    }
    Ok(succeeded)
}

async fn run_photo_chain(
    services: &Services,
    photo: &PhotoRecord,
    prompts: &[PromptRecord],
    options: &PromptsOptions,
) -> ChainResult {
    let steps: Vec<ChainStep> = prompts.iter().cloned().map(ChainStep::from).collect();
    // photos_with_images only returns photos with an attachment.
    let input_url = photo.first_image_url().unwrap_or_default();
    let mut request =
        ChainRequest::new(&photo.id, &photo.name, input_url, steps).with_mode(options.mode);
    if let Some(use_case) = &options.use_case {
        request = request.with_variable("use_case", use_case);
    }
    services.chain.run(request).await
}

/// `restore-dir ...`: every prompt file against every photo, each prompt
/// reading the photo itself. One photo failing does not stop the others.
pub async fn run_restore_dir(
    chain: &PromptChainRunner,
    store: &LocalResultStore,
    options: &RestoreDirOptions,
) -> Result<usize, PipelineError> {
    let prompts = read_prompts(&options.prompts_dir).await?;
    let photos = find_photos(&options.photos_dir, options.only_photo.as_deref()).await?;

    println!("Photos found: {}", photos.len());
    println!("Prompts found: {}", prompts.len());
    println!("Output: {}", store.output_dir().display());

    if options.dry_run {
        for photo in &photos {
            println!("{} -> {}", photo.file_name(), store.output_dir().join(&photo.stem).display());
            for (i, prompt) in prompts.iter().enumerate() {
                println!("  [{}/{}] {} as {}", i + 1, prompts.len(), prompt.file_name, prompt.slug);
            }
        }
        return Ok(photos.len());
    }

    let mut succeeded = 0;
    for photo in &photos {
        println!("\nProcessing: {}", photo.file_name());
        if let Err(e) = store.copy_original(&photo.stem, &photo.path).await {
            tracing::error!(photo = %photo.stem, error = %e, "Failed to copy original");
            println!("  error: {e}");
            continue;
        }

        let result = chain
            .run(folder_request(photo, &prompts, options.model.as_deref()))
            .await;
        for step in &result.steps {
            match &step.error {
                Some(error) => println!("  {}: failed: {error}", step.slug),
                None => println!("  {}: {} image(s)", step.slug, step.outputs.len()),
            }
        }
        if result.succeeded() > 0 {
            succeeded += 1;
        }
    }
    Ok(succeeded)
}

fn print_prompts(prompts: &[PromptRecord]) {
    for (i, prompt) in prompts.iter().enumerate() {
        println!(
            "  [{}/{}] {} ({}, priority {})",
            i + 1,
            prompts.len(),
            prompt.name,
            prompt.use_case,
            prompt.execution_priority,
        );
    }
}

fn print_final_output(chain: &ChainResult) {
    if let Some(output) = &chain.final_output {
        println!("  Final output: {output}");
    }
}

/// Process exit status for a finished command.
pub fn exit_code(photos_succeeded: usize) -> u8 {
    if photos_succeeded == 0 {
        1
    } else {
        0
    }
}
