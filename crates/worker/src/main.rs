mod cli;
mod commands;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use heirloom_airtable::{AirtableClient, AirtableConfig};
use heirloom_events::{EventBus, EventLogger};
use heirloom_gemini::{GeminiClient, GeminiConfig};
use heirloom_pipeline::{
    HttpImageFetcher, LocalResultStore, PromptCatalog, PromptChainRunner, StorageConfig,
    WorkflowRunner,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Command;
use commands::Services;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heirloom_worker=debug,heirloom_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse_args(&args) {
        Ok(Command::Help) => {
            print!("{}", cli::usage());
            return ExitCode::SUCCESS;
        }
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", cli::usage());
            return ExitCode::from(2);
        }
    };

    let gemini_config = GeminiConfig::from_env();
    let mut storage_config = StorageConfig::from_env();
    if let Command::RestoreDir(options) = &command {
        if let Some(out_dir) = &options.out_dir {
            storage_config.output_dir = out_dir.clone();
        }
    }
    tracing::info!(
        model = %gemini_config.model,
        output_dir = %storage_config.output_dir.display(),
        "Loaded configuration",
    );

    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(event_bus.subscribe()));

    let store = Arc::new(LocalResultStore::new(storage_config));
    let mut chain = PromptChainRunner::new(
        Arc::new(HttpImageFetcher::new()),
        Arc::new(GeminiClient::new(&gemini_config)),
        store.clone(),
        Arc::clone(&event_bus),
    );

    let result = if command.needs_records() {
        let airtable_config = AirtableConfig::from_env();
        tracing::info!(base_id = %airtable_config.base_id, "Using Airtable base");
        let records = Arc::new(AirtableClient::new(&airtable_config));
        let tables = airtable_config.tables.clone();
        chain = chain.with_execution_log(records.clone(), tables.test_runs.clone());
        let chain = Arc::new(chain);
        let catalog = Arc::new(PromptCatalog::new(records.clone(), tables.clone()));
        let workflows = WorkflowRunner::new(
            Arc::clone(&catalog),
            Arc::clone(&chain),
            records,
            tables.photos,
        );
        let services = Services {
            catalog,
            chain,
            workflows,
        };
        match &command {
            Command::Workflow { photo_ids, dry_run } => {
                commands::run_workflows(&services, photo_ids, *dry_run).await
            }
            Command::Prompts(options) => commands::run_prompts(&services, options).await,
            _ => Ok(0),
        }
    } else {
        let result = match &command {
            Command::RestoreDir(options) => {
                commands::run_restore_dir(&chain, &store, options).await
            }
            _ => Ok(0),
        };
        drop(chain);
        result
    };
    let dry_run = match &command {
        Command::Workflow { dry_run, .. } => *dry_run,
        Command::Prompts(options) => options.dry_run,
        Command::RestoreDir(options) => options.dry_run,
        Command::Help => true,
    };

    // The runner is gone by now; closing the last sender lets the logger
    // drain and exit.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    match result {
        Ok(_) if dry_run => ExitCode::SUCCESS,
        Ok(succeeded) => {
            tracing::info!(photos_succeeded = succeeded, "Run finished");
            ExitCode::from(commands::exit_code(succeeded))
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
