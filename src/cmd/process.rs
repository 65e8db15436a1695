//! One-shot batch run against the database - `itemhub process`.

use std::sync::Arc;

use anyhow::{Context, Result};
use itemhub::batch::{BatchOrchestrator, WorkerPool};
use itemhub::config::ServiceConfig;
use itemhub::server::open_store;

pub async fn cmd_process(config: &ServiceConfig) -> Result<()> {
    if config.storage.in_memory {
        anyhow::bail!("Nothing to process: the in-memory store starts empty");
    }
    if !config.storage.db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'itemhub init' first.",
            config.storage.db_path.display()
        );
    }

    let store = open_store(config)?;
    let pool = Arc::new(WorkerPool::new(config.batch.pool_config()));
    let orchestrator = BatchOrchestrator::new(store, pool.clone())
        .with_processing_delay(config.batch.processing_delay())
        .with_failure_policy(config.batch.failure_policy);

    let result = orchestrator.process_all().await.join().await;
    pool.shutdown().await;

    let items = result.context("Batch processing failed")?;
    let json = serde_json::to_string_pretty(&items).context("Failed to serialize items")?;
    println!("{}", json);
    Ok(())
}
