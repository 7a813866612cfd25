//! Portal Docs Server
//!
//! Keeps the company portal's newsletters, brochures and regulations in a
//! local versioned cache and rasterizes their PDFs into inline page images.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_docs::config::Config;
use portal_docs::db::DocumentStore;
use portal_docs::ingest::{IngestionCoordinator, JsonFileStore, LegacyMigration, MigrationOutcome, StaticSourceFetcher};
use portal_docs::manifest;
use portal_docs::raster::MuPdfRasterizer;
use portal_docs::routes;
use portal_docs::startup;
use portal_docs::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "portal_docs=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Portal Docs Server v{}", env!("CARGO_PKG_VERSION"));

    let policies = match &config.database.manifest_path {
        Some(path) => manifest::load_policies(path).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load manifest {}: {}, using built-in policies", path.display(), e);
            manifest::builtin_policies()
        }),
        None => manifest::builtin_policies(),
    };

    // Initialize cache store
    let store = DocumentStore::open(
        &config.database.data_dir,
        &config.database.name,
        config.database.version,
    )
    .await
    .context("Failed to open document cache store")?;
    tracing::info!(
        "Document cache at {} (version {})",
        store.path().display(),
        store.version()
    );

    // Ingestion pipeline
    let rasterizer = Arc::new(MuPdfRasterizer::new(config.raster.options()));
    let fetcher = StaticSourceFetcher::new(
        config.sources.static_dir.clone(),
        config.sources.base_url.clone(),
        config.sources.fetch_timeout,
    )
    .context("Failed to build HTTP client")?;
    let coordinator = Arc::new(
        IngestionCoordinator::new(rasterizer.clone(), Arc::new(fetcher))
            .with_max_concurrent(config.raster.max_concurrent),
    );

    let legacy = JsonFileStore::new(&config.legacy.path);
    let migration = LegacyMigration::new(config.legacy.key.clone());
    let report = startup::initialize(&store, &coordinator, &policies, &legacy, &migration).await;

    if let MigrationOutcome::Migrated(count) = report.migration {
        tracing::info!("Migrated {} legacy records", count);
    }
    for reconciled in &report.reconciled {
        tracing::info!(
            "{}: {} documents ({} failed to render)",
            reconciled.collection,
            reconciled.total,
            reconciled.failed.len()
        );
    }
    let stats = rasterizer.stats();
    tracing::info!(
        documents = stats.documents,
        covers = stats.covers,
        pages = stats.pages,
        failures = stats.failures,
        "Startup rasterization finished"
    );

    // Create application state
    let app_state = AppState::new(store, coordinator, policies);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::app(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Portal Docs Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.shutdown().await;
    let stats = rasterizer.stats();
    tracing::info!(
        documents = stats.documents,
        covers = stats.covers,
        pages = stats.pages,
        failures = stats.failures,
        "Rasterizer totals"
    );
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
