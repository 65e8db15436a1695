//! Concurrent "process all items" pipeline.
//!
//! A batch run lists every stored identifier, submits one task per
//! identifier to a bounded worker pool, waits at a join barrier for all of
//! them, and aggregates the outcomes into a single result.
//!
//! ## Architecture
//!
//! 1. **Pool** - bounded concurrency, shared across runs, explicit shutdown
//! 2. **Processor** - per-item step: find, mark processed, save
//! 3. **State** - per-run outcome ledger and aggregation
//! 4. **Orchestrator** - fan-out, join barrier and failure policy
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use itemhub::batch::{BatchOrchestrator, PoolConfig, WorkerPool};
//! use itemhub::store::MemoryItemStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryItemStore::new());
//! let pool = Arc::new(WorkerPool::new(PoolConfig::default()));
//! let orchestrator = BatchOrchestrator::new(store, pool.clone());
//!
//! let items = orchestrator.process_all().await.join().await?;
//! println!("processed {} items", items.len());
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod pool;
mod processor;
mod state;

pub use orchestrator::{BatchHandle, BatchOrchestrator, BatchResult, FailurePolicy};
pub use pool::{PoolConfig, WorkerPool, default_max_workers};
pub use processor::{DEFAULT_PROCESSING_DELAY, ItemProcessor};
pub use state::{BatchRun, BatchState, BatchSummary, ItemOutcome};
