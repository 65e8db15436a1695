//! HTTP surface: router assembly and the serve loop.

pub mod api;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::batch::{BatchOrchestrator, WorkerPool};
use crate::config::ServiceConfig;
use crate::service::ItemService;
use crate::store::{ItemStore, MemoryItemStore, SqliteItemStore};

pub use api::{AppState, SharedState};

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the storage backend selected by the configuration.
pub fn open_store(config: &ServiceConfig) -> Result<Arc<dyn ItemStore>> {
    if config.storage.in_memory {
        tracing::info!("Using in-memory item store");
        return Ok(Arc::new(MemoryItemStore::new()));
    }

    let path = &config.storage.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = SqliteItemStore::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    tracing::info!(path = %path.display(), "Using SQLite item store");
    Ok(Arc::new(store))
}

/// Wire store, worker pool and service into the shared state.
pub fn build_state(store: Arc<dyn ItemStore>, pool: Arc<WorkerPool>, config: &ServiceConfig) -> SharedState {
    let orchestrator = BatchOrchestrator::new(store.clone(), pool)
        .with_processing_delay(config.batch.processing_delay())
        .with_failure_policy(config.batch.failure_policy);
    Arc::new(AppState {
        service: ItemService::new(store, orchestrator),
    })
}

/// Start the item server and block until Ctrl+C.
///
/// Ctrl+C interrupts running batches, then the HTTP server drains.
pub async fn start_server(config: ServiceConfig, permissive_cors: bool) -> Result<()> {
    let store = open_store(&config)?;
    let pool = Arc::new(WorkerPool::new(config.batch.pool_config()));
    let state = build_state(store, pool.clone(), &config);

    let mut app = build_router(state);
    if permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "itemhub listening");
    println!("itemhub running at http://{}", local_addr);

    serve(listener, app, pool, shutdown_signal()).await?;

    println!("Server shut down gracefully.");
    Ok(())
}

/// Serve `app` until `signal` fires, then tear down.
///
/// The pool is shut down as soon as the signal fires, before HTTP drains.
/// A pending `/api/items/process` request then resolves with a 500 instead
/// of holding the drain open until its batch finishes.
pub async fn serve<S>(
    listener: tokio::net::TcpListener,
    app: Router,
    pool: Arc<WorkerPool>,
    signal: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let teardown = pool.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            teardown.shutdown().await;
        })
        .await
        .context("Server error");

    // No-op after a signalled shutdown; covers a server that failed first.
    pool.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
