//! Typed error hierarchy for itemhub.
//!
//! Each layer owns one enum:
//! - `StoreError` - storage port failures
//! - `ProcessError` - why a single item failed inside a batch
//! - `PoolError` - worker pool scheduling failures
//! - `BatchError` - why a whole batch run failed
//! - `ServiceError` - CRUD facade failures surfaced to the API

use itemhub_common::{ItemId, ValidationErrors};
use thiserror::Error;

/// Errors raised by an `ItemStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    TaskFailed(#[source] tokio::task::JoinError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Failure cause of one item inside a batch run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to process item {id}: {source}")]
    Storage {
        id: ItemId,
        #[source]
        source: StoreError,
    },

    #[error("Processing interrupted")]
    Interrupted,

    #[error("Task was not scheduled before the worker pool shut down")]
    NotScheduled,

    #[error("Processing task panicked: {0}")]
    Panicked(String),
}

/// Errors from the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,
}

/// Errors that fail an entire batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to list item identifiers: {0}")]
    Listing(#[source] StoreError),

    #[error("Item {id} failed: {source}")]
    ItemFailed {
        id: ItemId,
        #[source]
        source: ProcessError,
    },

    #[error("Batch run was abandoned before delivering a result")]
    Abandoned,
}

/// Errors from the item service facade.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Item {id} not found")]
    ItemNotFound { id: ItemId },

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}
