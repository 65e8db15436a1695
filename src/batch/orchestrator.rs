//! Fan-out of one processing task per stored item, joined into one result.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use itemhub_common::{Item, ItemId};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pool::WorkerPool;
use super::processor::ItemProcessor;
use super::state::{BatchRun, BatchSummary, ItemOutcome};
use crate::errors::{BatchError, PoolError, ProcessError};
use crate::store::ItemStore;

/// Result delivered by a batch run.
pub type BatchResult = Result<Vec<Item>, BatchError>;

/// How a batch reacts to the first failed item.
///
/// Both policies fail the whole batch and both wait at the join barrier for
/// every task. `CancelOnFailure` additionally interrupts tasks that have not
/// finished yet so the barrier is reached sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    WaitAll,
    CancelOnFailure,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::WaitAll => write!(f, "wait_all"),
            FailurePolicy::CancelOnFailure => write!(f, "cancel_on_failure"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "wait_all" => Ok(FailurePolicy::WaitAll),
            "cancel_on_failure" => Ok(FailurePolicy::CancelOnFailure),
            _ => anyhow::bail!(
                "Invalid failure policy '{}'. Valid values: wait_all, cancel_on_failure",
                s
            ),
        }
    }
}

/// Handle to the eventual result of one batch run.
///
/// The result is buffered in a oneshot channel, so it is never lost whether
/// the run finishes before or after someone starts waiting.
#[derive(Debug)]
pub struct BatchHandle {
    run_id: Uuid,
    submitted: usize,
    rx: oneshot::Receiver<BatchResult>,
}

impl BatchHandle {
    /// A handle plus the sender that resolves it.
    pub(crate) fn channel(run_id: Uuid, submitted: usize) -> (oneshot::Sender<BatchResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { run_id, submitted, rx })
    }

    /// A handle that is already resolved.
    pub(crate) fn resolved(run_id: Uuid, result: BatchResult) -> Self {
        let (tx, handle) = Self::channel(run_id, 0);
        // The receiver is alive in `handle`, so the send cannot fail.
        let _ = tx.send(result);
        handle
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of tasks submitted to the worker pool for this run.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Wait for the run to finish. A run whose producer vanished without
    /// delivering resolves to `BatchError::Abandoned`.
    pub async fn join(self) -> BatchResult {
        self.rx.await.unwrap_or(Err(BatchError::Abandoned))
    }
}

/// Runs `ItemProcessor` for every stored identifier on the shared worker pool.
pub struct BatchOrchestrator {
    store: Arc<dyn ItemStore>,
    pool: Arc<WorkerPool>,
    processor: ItemProcessor,
    policy: FailurePolicy,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn ItemStore>, pool: Arc<WorkerPool>) -> Self {
        Self {
            processor: ItemProcessor::new(store.clone()),
            store,
            pool,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processor = self.processor.with_delay(delay);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a batch run over every stored item.
    ///
    /// Only the identifier listing is awaited here. Processing and
    /// aggregation continue in the background and resolve the returned
    /// handle exactly once.
    #[tracing::instrument(skip(self), fields(run_id))]
    pub async fn process_all(&self) -> BatchHandle {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let ids = match self.store.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list items for batch");
                return BatchHandle::resolved(run_id, Err(BatchError::Listing(e)));
            }
        };

        if ids.is_empty() {
            tracing::info!("No items to process");
            return BatchHandle::resolved(run_id, Ok(Vec::new()));
        }

        tracing::info!(
            items = ids.len(),
            max_workers = self.pool.max_workers(),
            policy = %self.policy,
            "Starting batch run"
        );

        let cancel = self.pool.child_token();
        let tasks = FuturesUnordered::new();
        for id in ids.iter().copied() {
            let processor = self.processor.clone();
            let token = cancel.clone();
            let handle = self
                .pool
                .submit(async move { processor.process(id, &token).await });
            tasks.push(async move { (id, handle.await) });
        }

        let (tx, handle) = BatchHandle::channel(run_id, ids.len());
        let run = BatchRun::start(run_id, ids);
        let policy = self.policy;

        tokio::spawn(async move {
            let (summary, result) = settle(run, tasks, cancel, policy).await;
            log_summary(&summary, &result);
            if tx.send(result).is_err() {
                tracing::debug!(run_id = %summary.run_id, "Batch result dropped: nobody is waiting");
            }
        });

        handle
    }
}

type Joined = (
    ItemId,
    Result<Result<ItemOutcome, PoolError>, tokio::task::JoinError>,
);

/// Join barrier: wait for every task, then aggregate.
async fn settle<F>(
    mut run: BatchRun,
    mut tasks: FuturesUnordered<F>,
    cancel: CancellationToken,
    policy: FailurePolicy,
) -> (BatchSummary, BatchResult)
where
    F: std::future::Future<Output = Joined>,
{
    let run_id = run.id();
    while let Some((id, joined)) = tasks.next().await {
        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(PoolError::ShutDown)) => ItemOutcome::Failed(ProcessError::NotScheduled),
            Err(e) if e.is_panic() => ItemOutcome::Failed(ProcessError::Panicked(e.to_string())),
            Err(_) => ItemOutcome::Failed(ProcessError::Interrupted),
        };

        if let ItemOutcome::Failed(cause) = &outcome {
            tracing::warn!(run_id = %run_id, item_id = id, error = %cause, "Item processing failed");
            if policy == FailurePolicy::CancelOnFailure && !cancel.is_cancelled() {
                tracing::info!(run_id = %run_id, "Cancelling remaining items after failure");
                cancel.cancel();
            }
        } else {
            tracing::trace!(run_id = %run_id, item_id = id, outcome = outcome.kind(), "Item settled");
        }

        run.record(id, outcome);
    }
    run.finish()
}

fn log_summary(summary: &BatchSummary, result: &BatchResult) {
    match result {
        Ok(items) => tracing::info!(
            run_id = %summary.run_id,
            processed = items.len(),
            missing = summary.missing,
            duration_ms = summary.duration_ms,
            "Batch run completed"
        ),
        Err(e) => tracing::error!(
            run_id = %summary.run_id,
            processed = summary.processed,
            missing = summary.missing,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            error = %e,
            "Batch run failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::pool::PoolConfig;
    use crate::store::testing::ScriptedStore;
    use itemhub_common::ItemStatus;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn pool(max_workers: usize) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new(
            PoolConfig::default()
                .with_max_workers(max_workers)
                .with_shutdown_timeout(Duration::from_secs(2)),
        ))
    }

    fn orchestrator(store: &Arc<ScriptedStore>, pool: &Arc<WorkerPool>) -> BatchOrchestrator {
        BatchOrchestrator::new(store.clone(), pool.clone()).with_processing_delay(Duration::ZERO)
    }

    async fn seed_new(store: &ScriptedStore, count: usize) {
        for n in 0..count {
            store
                .seed(Item::new(&format!("Item{}", n), "", &format!("e{}@example.com", n)))
                .await;
        }
    }

    #[tokio::test]
    async fn test_every_existing_item_is_processed_once() {
        let store = Arc::new(ScriptedStore::new());
        seed_new(&store, 5).await;
        let pool = pool(3);

        let handle = orchestrator(&store, &pool).process_all().await;
        assert_eq!(handle.submitted(), 5);
        let items = handle.join().await.unwrap();

        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|i| i.status == ItemStatus::Processed));
        let ids: HashSet<_> = items.iter().map(|i| i.id.unwrap()).collect();
        assert_eq!(ids, (1..=5).collect());
        assert_eq!(store.saves.load(Ordering::SeqCst), 5);
        for id in 1..=5 {
            assert!(store.stored(id).await.unwrap().status.is_processed());
        }
    }

    #[tokio::test]
    async fn test_missing_item_is_dropped_without_failing() {
        let store = Arc::new(ScriptedStore::new());
        store.seed(Item::new("Item1", "Desc1", "email1@example.com")).await;
        store.list_phantom_id(2);
        let pool = pool(2);

        let items = orchestrator(&store, &pool)
            .process_all()
            .await
            .join()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, Some(1));
        assert_eq!(items[0].status, ItemStatus::Processed);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_error_fails_batch() {
        let store = Arc::new(ScriptedStore::new());
        store.seed(Item::new("Item1", "", "e@example.com")).await;
        store.fail_lookup_of(1);
        let pool = pool(2);

        let result = orchestrator(&store, &pool).process_all().await.join().await;
        match result {
            Err(BatchError::ItemFailed { id, source }) => {
                assert_eq!(id, 1);
                assert!(matches!(source, ProcessError::Storage { .. }));
            }
            other => panic!("Expected ItemFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_one_failure_fails_batch_but_others_still_run() {
        let store = Arc::new(ScriptedStore::new());
        seed_new(&store, 4).await;
        store.fail_save_of(3);
        let pool = pool(4);

        let result = orchestrator(&store, &pool).process_all().await.join().await;
        assert!(matches!(result, Err(BatchError::ItemFailed { id: 3, .. })));
        // Wait-all policy: every other item was still processed.
        for id in [1, 2, 4] {
            assert!(store.stored(id).await.unwrap().status.is_processed());
        }
        assert_eq!(store.stored(3).await.unwrap().status, ItemStatus::New);
    }

    #[tokio::test]
    async fn test_empty_store_resolves_immediately_without_tasks() {
        let store = Arc::new(ScriptedStore::new());
        let pool = pool(2);

        let handle = orchestrator(&store, &pool).process_all().await;
        assert_eq!(handle.submitted(), 0);
        assert!(handle.join().await.unwrap().is_empty());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(store.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listing_error_fails_batch() {
        let store = Arc::new(ScriptedStore::new());
        store.fail_listing();
        let pool = pool(2);

        let result = orchestrator(&store, &pool).process_all().await.join().await;
        assert!(matches!(result, Err(BatchError::Listing(_))));
    }

    #[tokio::test]
    async fn test_pool_shutdown_interrupts_in_flight_items() {
        let store = Arc::new(ScriptedStore::new());
        store.seed(Item::new("Item1", "", "e@example.com")).await;
        store.delay_lookups(Duration::from_secs(30));
        let pool = pool(1);

        let handle = orchestrator(&store, &pool).process_all().await;
        store.lookup_started.notified().await;
        pool.shutdown().await;

        let result = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("join barrier must not hang after shutdown");
        assert!(matches!(
            result,
            Err(BatchError::ItemFailed {
                id: 1,
                source: ProcessError::Interrupted
            })
        ));
        assert_eq!(store.stored(1).await.unwrap().status, ItemStatus::New);
    }

    #[tokio::test]
    async fn test_tasks_after_shutdown_fail_as_not_scheduled() {
        let store = Arc::new(ScriptedStore::new());
        seed_new(&store, 2).await;
        let pool = pool(2);
        pool.shutdown().await;

        let result = orchestrator(&store, &pool).process_all().await.join().await;
        assert!(matches!(
            result,
            Err(BatchError::ItemFailed {
                source: ProcessError::NotScheduled,
                ..
            })
        ));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_on_failure_interrupts_remaining_items() {
        let store = Arc::new(ScriptedStore::new());
        seed_new(&store, 3).await;
        store.fail_lookup_of(1);
        let pool = pool(1);

        let orchestrator = BatchOrchestrator::new(store.clone(), pool.clone())
            .with_processing_delay(Duration::from_millis(50))
            .with_failure_policy(FailurePolicy::CancelOnFailure);

        let result = orchestrator.process_all().await.join().await;
        assert!(matches!(result, Err(BatchError::ItemFailed { .. })));
        // With one worker the failing item runs first; the rest are interrupted
        // before they reach storage.
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        assert_eq!(store.stored(2).await.unwrap().status, ItemStatus::New);
        assert_eq!(store.stored(3).await.unwrap().status, ItemStatus::New);
    }

    #[tokio::test]
    async fn test_result_survives_late_join() {
        let store = Arc::new(ScriptedStore::new());
        seed_new(&store, 2).await;
        let pool = pool(2);

        let handle = orchestrator(&store, &pool).process_all().await;
        // Let the run finish before anyone waits on it.
        while store.saves.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.join().await.unwrap().len(), 2);
    }

    #[test]
    fn test_failure_policy_parse_and_display() {
        use std::str::FromStr;
        assert_eq!(
            FailurePolicy::from_str("cancel-on-failure").unwrap(),
            FailurePolicy::CancelOnFailure
        );
        assert_eq!(FailurePolicy::from_str("WAIT_ALL").unwrap(), FailurePolicy::WaitAll);
        assert!(FailurePolicy::from_str("sometimes").is_err());
        assert_eq!(FailurePolicy::CancelOnFailure.to_string(), "cancel_on_failure");
    }

    #[tokio::test]
    async fn test_dropped_sender_is_abandoned() {
        let (tx, handle) = BatchHandle::channel(Uuid::new_v4(), 1);
        drop(tx);
        assert!(matches!(handle.join().await, Err(BatchError::Abandoned)));
    }
}
