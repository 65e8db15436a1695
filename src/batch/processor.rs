//! Single-item processing step run inside a worker task.

use std::sync::Arc;
use std::time::Duration;

use itemhub_common::{ItemId, ItemStatus};
use tokio_util::sync::CancellationToken;

use super::state::ItemOutcome;
use crate::errors::ProcessError;
use crate::store::ItemStore;

/// Default simulated work per item.
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_millis(100);

/// Marks one item `PROCESSED` and persists it.
///
/// Never panics on storage errors: every failure comes back as
/// `ItemOutcome::Failed`. Cancellation is honoured up to the save; the save
/// itself is never raced, so an item is either left untouched or fully
/// written.
#[derive(Clone)]
pub struct ItemProcessor {
    store: Arc<dyn ItemStore>,
    delay: Duration,
}

impl ItemProcessor {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            delay: DEFAULT_PROCESSING_DELAY,
        }
    }

    /// Set the simulated per-item work. Zero disables it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn process(&self, id: ItemId, cancel: &CancellationToken) -> ItemOutcome {
        if !self.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ItemOutcome::Failed(ProcessError::Interrupted),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ItemOutcome::Failed(ProcessError::Interrupted),
            found = self.store.find_by_id(id) => found,
        };

        let mut item = match found {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::debug!(item_id = id, "Item vanished before processing");
                return ItemOutcome::Missing;
            }
            Err(source) => return ItemOutcome::Failed(ProcessError::Storage { id, source }),
        };

        if cancel.is_cancelled() {
            return ItemOutcome::Failed(ProcessError::Interrupted);
        }

        item.status = ItemStatus::Processed;
        match self.store.save(item).await {
            Ok(saved) => ItemOutcome::Processed(saved),
            Err(source) => ItemOutcome::Failed(ProcessError::Storage { id, source }),
        }
    }
}
