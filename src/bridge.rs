//! Hands the eventual result of a batch run to the HTTP response.
//!
//! The handler that triggers a batch must not block a runtime thread while
//! the batch runs. `respond` turns a `BatchHandle` into a `DeferredResult`
//! the handler can await, resolved exactly once with either the processed
//! items or a generic 500.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::batch::BatchHandle;

/// Body text for every failure delivered through the bridge.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// The resolver went away without providing a value.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Deferred result was dropped before it was resolved")]
pub struct Unresolved;

/// Write side of a deferred result. Consumed by `resolve`.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Resolver<T> {
    /// Deliver the value. Returns false when nobody is waiting any more.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

/// Read side of a deferred result.
///
/// The value is buffered, so it arrives whether the resolver runs before or
/// after this future is first polled.
#[derive(Debug)]
pub struct DeferredResult<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> DeferredResult<T> {
    /// Wait for the value, substituting `fallback` when the resolver was dropped.
    pub async fn unwrap_or_else(self, fallback: impl FnOnce() -> T) -> T {
        self.await.unwrap_or_else(|Unresolved| fallback())
    }
}

impl<T> Future for DeferredResult<T> {
    type Output = Result<T, Unresolved>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| Unresolved))
    }
}

/// Create a linked resolver and deferred result.
pub fn deferred<T>() -> (Resolver<T>, DeferredResult<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, DeferredResult { rx })
}

/// Generic 500 used for every batch failure. The cause is logged, never sent.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": INTERNAL_ERROR_MESSAGE})),
    )
        .into_response()
}

/// Bridge a batch run to an HTTP response.
///
/// Spawns one continuation that waits for the batch and resolves the
/// returned `DeferredResult` with 200 and the processed items, or 500 on
/// failure. If that continuation dies, the resolver is dropped and the
/// caller falls back to 500 as well.
pub fn respond(handle: BatchHandle) -> DeferredResult<Response> {
    let (resolver, deferred) = deferred();
    let run_id = handle.run_id();

    tokio::spawn(async move {
        let response = match handle.join().await {
            Ok(items) => (StatusCode::OK, Json(items)).into_response(),
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Batch processing failed");
                internal_error()
            }
        };
        if !resolver.resolve(response) {
            tracing::debug!(run_id = %run_id, "Client went away before batch result was ready");
        }
    });

    deferred
}
