use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use heirloom_airtable::{AirtableClient, AirtableConfig};
use heirloom_core::signature::WebhookVerifier;
use heirloom_db::{JobStore, MemoryJobStore, PgJobStore};
use heirloom_events::{EventBus, EventLogger};
use heirloom_gemini::{GeminiClient, GeminiConfig};
use heirloom_pipeline::{
    BatchCoordinator, HttpImageFetcher, JobDispatcher, LocalResultStore, RecordIntake,
    RestorationPipeline, StatusReporter, StorageConfig,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heirloom_api::config::ServerConfig;
use heirloom_api::router::build_app_router;
use heirloom_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "heirloom_api=debug,heirloom_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    let airtable_config = AirtableConfig::from_env();
    let gemini_config = GeminiConfig::from_env();
    let storage_config = StorageConfig::from_env();
    tracing::info!(
        base_id = %airtable_config.base_id,
        model = %gemini_config.model,
        output_dir = %storage_config.output_dir.display(),
        "Loaded client configuration",
    );

    // --- Job store ---
    let (jobs, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = heirloom_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            heirloom_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            heirloom_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            (store, None)
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(event_bus.subscribe()));
    tracing::info!("Event bus created");

    // --- Pipeline ---
    let records = Arc::new(AirtableClient::new(&airtable_config));
    let tables = airtable_config.tables.clone();
    let pipeline = Arc::new(
        RestorationPipeline::new(
            Arc::clone(&jobs),
            Arc::new(HttpImageFetcher::new()),
            Arc::new(GeminiClient::new(&gemini_config)),
            Arc::new(LocalResultStore::new(storage_config)),
            Arc::clone(&event_bus),
        )
        .with_record_store(records.clone(), tables.restorations.clone()),
    );
    let coordinator = Arc::new(BatchCoordinator::new(
        Arc::clone(&pipeline),
        Arc::clone(&event_bus),
    ));
    let intake = Arc::new(RecordIntake::new(
        Arc::clone(&jobs),
        records.clone(),
        Arc::clone(&coordinator),
        Arc::clone(&event_bus),
        tables.restorations.clone(),
    ));
    let reporter = Arc::new(
        StatusReporter::new(Arc::clone(&jobs)).with_record_store(records, tables.restorations),
    );

    // --- Webhook verification ---
    let verifier = WebhookVerifier::from_secret(config.webhook_secret.clone());
    if verifier.is_permissive() {
        tracing::warn!("AIRTABLE_WEBHOOK_SECRET not set, webhook signatures are NOT verified");
    }

    // --- Dispatcher ---
    let dispatcher_cancel = CancellationToken::new();
    let dispatcher_handle = if config.dispatcher_enabled {
        let dispatcher = JobDispatcher::new(Arc::clone(&pipeline))
            .with_poll_interval(Duration::from_secs(config.dispatcher_poll_secs));
        let cancel = dispatcher_cancel.clone();
        Some(tokio::spawn(async move { dispatcher.run(cancel).await }))
    } else {
        tracing::info!("Job dispatcher disabled");
        None
    };

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline,
        coordinator,
        intake,
        reporter,
        verifier: Arc::new(verifier),
        event_bus: Arc::clone(&event_bus),
        pool,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop picking up queued jobs; the job in flight is allowed to finish.
    dispatcher_cancel.cancel();
    if let Some(handle) = dispatcher_handle {
        let drain = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(drain, handle).await.is_err() {
            tracing::warn!("Dispatcher did not stop within the shutdown timeout");
        }
    }
    tracing::info!("Dispatcher stopped");

    // Closing the last sender ends the logger once it has drained the channel.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;
    tracing::info!("Event logger shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
