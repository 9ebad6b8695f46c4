// Main entry point for the scrape orchestration server

use std::sync::Arc;

use anyhow::{Context, Result};
use scrape_core::{
    DiscoveryPipeline, JobProcessor, LogAlertSink, Orchestrator, PostgresStore, RecurringTrigger,
    WebhookDispatcher,
};
use server_core::kernel::jobs::{JobWorker, JobWorkerConfig, WebhookWorker};
use server_core::kernel::scheduled_tasks::start_scheduler;
use server_core::kernel::{
    HttpFetcher, HttpWebhookTransport, LogDestinationHandler, PageSnapshotExtractor, SearchClient,
    ServiceHost,
};
use server_core::server::{build_app, AppState};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,scrape_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting scrape orchestration server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let core_config = config.orchestrator_config();
    tracing::info!(workers = config.worker_count, "Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(
        PostgresStore::from_pool(pool)
            .await
            .context("Failed to prepare database schema")?,
    );
    tracing::info!("Database connected");

    // Outbound adapters
    let fetcher = Arc::new(HttpFetcher::new(
        &config.fetch_service_url,
        core_config.escalation.clone(),
    )?);
    let searcher = Arc::new(SearchClient::new(&config.search_service_url)?);
    let transport = Arc::new(HttpWebhookTransport::new(core_config.webhook.request_timeout)?);

    // Core components
    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        fetcher,
        Arc::new(PageSnapshotExtractor),
        Arc::new(LogAlertSink),
        core_config.clone(),
    ));
    let pipeline = Arc::new(
        DiscoveryPipeline::new(store.clone(), searcher, core_config.discovery.clone())
            .with_destination_handler(Arc::new(LogDestinationHandler)),
    );
    let webhooks = Arc::new(WebhookDispatcher::new(
        store.clone(),
        transport,
        core_config.webhook.clone(),
    ));
    let trigger = Arc::new(RecurringTrigger::new(
        store.clone(),
        pipeline.clone(),
        core_config.trigger.clone(),
    ));
    let orchestrator = Orchestrator::new(store.clone(), pipeline, webhooks.clone());

    // Scheduled tasks
    let mut scheduler = start_scheduler(trigger)
        .await
        .context("Failed to start scheduler")?;

    // Background services
    let mut host = ServiceHost::new();
    for _ in 0..config.worker_count {
        host = host.with_service(JobWorker::new(
            store.clone(),
            processor.clone(),
            JobWorkerConfig::from_worker_config(&core_config.worker),
        ));
    }
    host = host.with_service(WebhookWorker::new(webhooks));
    let shutdown = host.shutdown_token();

    // Start server
    let app = build_app(AppState::new(orchestrator));
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
    });

    host.run_until_shutdown().await?;

    // Services are drained; stop accepting requests and scheduling cycles.
    shutdown.cancel();
    server
        .await
        .context("Server task panicked")?
        .context("Server error")?;
    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
