//! Bounded worker pool shared by every batch run.
//!
//! The pool is an explicit lifecycle object: build it once at startup, hand
//! it to the orchestrator by `Arc`, and call `shutdown` during teardown.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::PoolError;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum tasks running at once. Further tasks queue for a permit.
    pub max_workers: usize,
    /// How long `shutdown` waits for cancelled tasks to wind down.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Available parallelism of the host, or 4 when it cannot be determined.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Decrements the in-flight counter when a task ends, panicking or not.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
    shutdown_timeout: Duration,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        tracing::info!(max_workers, "Starting worker pool");
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            shutdown_timeout: config.shutdown_timeout,
            shutdown_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// A token cancelled when the pool shuts down. Cancelling the child does
    /// not affect the pool.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Queue `job` for execution.
    ///
    /// The returned handle yields `PoolError::ShutDown` when the pool shut
    /// down before the job acquired a permit, including jobs submitted after
    /// shutdown. A job that started always runs to its own completion; it is
    /// expected to watch a token from `child_token` to stop early.
    pub fn submit<F>(&self, job: F) -> JoinHandle<Result<F::Output, PoolError>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        let shutdown = self.shutdown_token.clone();
        let in_flight = self.in_flight.clone();

        self.tracker.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(PoolError::ShutDown),
                permit = permits.acquire_owned() => permit.map_err(|_| PoolError::ShutDown)?,
            };
            let _permit = permit;

            in_flight.fetch_add(1, Ordering::SeqCst);
            let _guard = InFlightGuard(in_flight);
            Ok(job.await)
        })
    }

    /// Cancel in-flight work, stop handing out permits and wait for tracked
    /// tasks up to the configured timeout. Safe to call repeatedly and with
    /// nothing in flight.
    pub async fn shutdown(&self) {
        let first = !self.shutdown_token.is_cancelled();
        self.shutdown_token.cancel();
        self.permits.close();
        self.tracker.close();

        if first {
            tracing::info!(
                in_flight = self.in_flight(),
                queued = self.tracker.len(),
                "Shutting down worker pool"
            );
        }

        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
                "Worker pool tasks did not finish before shutdown timeout"
            );
        } else if first {
            tracing::info!("Worker pool shut down");
        }
    }
}
