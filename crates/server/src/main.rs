use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_core::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use triage_core::{
    build_embedder, build_executor, build_llm_client, build_vector_store, create_audit_system,
    load_config, validate_config, AuditEvent, AuditStore, Dispatcher, JobStore,
    PipelineDefinition, SemanticIndexer, SemanticSearch, SqliteAuditStore, SqliteJobStore,
    SqliteTicketStore, TicketStore,
};
use triage_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("LLM provider: {:?} ({})", config.llm.provider, config.llm.model);
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Stores share one SQLite file
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Stores initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // External services
    let llm = build_llm_client(&config.llm).context("Failed to create LLM client")?;
    info!("LLM client ready: {} / {}", llm.provider(), llm.model());

    let embedder = build_embedder(&config.embedding).context("Failed to create embedder")?;
    let vector_store = build_vector_store(&config.vector_store, embedder.dimension());
    let indexer = Arc::new(SemanticIndexer::new(vector_store, embedder.dimension()));
    info!(
        "Semantic index: {} backend, dimension {}",
        indexer.backend(),
        indexer.dimension()
    );

    let executor = build_executor(
        &config.executor,
        llm,
        &config.llm,
        Arc::clone(&embedder),
        Arc::clone(&indexer),
    );

    let dispatcher = Arc::new(
        Dispatcher::new(
            config.dispatcher.clone(),
            PipelineDefinition::classify_ticket(),
            Arc::new(executor),
            job_store,
            Arc::clone(&ticket_store),
            Some(audit_handle.clone()),
        )
        .context("Failed to create dispatcher")?,
    );

    let recovered = dispatcher
        .start()
        .await
        .context("Failed to start dispatcher")?;
    info!(recovered, "Dispatcher started");

    let search = Arc::new(SemanticSearch::new(
        embedder,
        indexer,
        config.search.clone(),
    ));

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&dispatcher),
        ticket_store,
        search,
        audit_handle.clone(),
        audit_store,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping dispatcher...");
    dispatcher.stop().await;

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone; the dispatcher
    // holds one.
    drop(dispatcher);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
