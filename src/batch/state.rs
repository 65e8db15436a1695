//! Per-run state for the batch pipeline.
//!
//! A `BatchRun` is created when a batch starts, collects one outcome per
//! identifier as tasks settle, and is consumed by `finish` once the join
//! barrier has passed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use itemhub_common::{Item, ItemId};
use uuid::Uuid;

use crate::errors::{BatchError, ProcessError};

/// Terminal result of processing one identifier.
#[derive(Debug)]
pub enum ItemOutcome {
    /// The item was found, marked processed and saved.
    Processed(Item),
    /// No item exists for the identifier. Not an error.
    Missing,
    /// Storage failed or the task was interrupted or never scheduled.
    Failed(ProcessError),
}

impl ItemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Processed(_) => "processed",
            Self::Missing => "missing",
            Self::Failed(_) => "failed",
        }
    }
}

/// Final state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Completed,
    Failed,
}

/// Counts and timing of a finished batch run, logged when the run ends.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub state: BatchState,
    pub total: usize,
    pub processed: usize,
    pub missing: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Snapshot of the identifiers a batch started with and the outcomes seen so far.
#[derive(Debug)]
pub struct BatchRun {
    id: Uuid,
    item_ids: Vec<ItemId>,
    outcomes: HashMap<ItemId, ItemOutcome>,
    /// Identifiers in the order their tasks settled.
    completion_order: Vec<ItemId>,
    started_at: DateTime<Utc>,
    timer: Instant,
}

impl BatchRun {
    pub fn start(id: Uuid, item_ids: Vec<ItemId>) -> Self {
        let capacity = item_ids.len();
        Self {
            id,
            item_ids,
            outcomes: HashMap::with_capacity(capacity),
            completion_order: Vec::with_capacity(capacity),
            started_at: Utc::now(),
            timer: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn outcome(&self, id: ItemId) -> Option<&ItemOutcome> {
        self.outcomes.get(&id)
    }

    /// Record the outcome for `id`. Only the first outcome per identifier is kept.
    pub fn record(&mut self, id: ItemId, outcome: ItemOutcome) {
        if self.outcomes.contains_key(&id) {
            return;
        }
        self.completion_order.push(id);
        self.outcomes.insert(id, outcome);
    }

    /// True once every identifier has an outcome.
    pub fn is_settled(&self) -> bool {
        self.item_ids.iter().all(|id| self.outcomes.contains_key(id))
    }

    fn summary(&self, state: BatchState) -> BatchSummary {
        let mut summary = BatchSummary {
            run_id: self.id,
            state,
            total: self.item_ids.len(),
            processed: 0,
            missing: 0,
            failed: 0,
            started_at: self.started_at,
            duration_ms: duration_ms(self.timer.elapsed()),
        };
        for outcome in self.outcomes.values() {
            match outcome {
                ItemOutcome::Processed(_) => summary.processed += 1,
                ItemOutcome::Missing => summary.missing += 1,
                ItemOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Aggregate outcomes in completion order.
    ///
    /// Processed items are collected, missing ones dropped, and the first
    /// failure in completion order fails the whole run. An identifier that
    /// never received an outcome counts as abandoned.
    pub fn finish(mut self) -> (BatchSummary, Result<Vec<Item>, BatchError>) {
        let failed = self.outcomes.values().any(ItemOutcome::is_failed);
        let state = if failed || !self.is_settled() {
            BatchState::Failed
        } else {
            BatchState::Completed
        };
        let summary = self.summary(state);

        if !self.is_settled() {
            return (summary, Err(BatchError::Abandoned));
        }

        let mut items = Vec::with_capacity(summary.processed);
        for id in std::mem::take(&mut self.completion_order) {
            match self.outcomes.remove(&id) {
                Some(ItemOutcome::Processed(item)) => items.push(item),
                Some(ItemOutcome::Missing) | None => {}
                Some(ItemOutcome::Failed(source)) => {
                    return (summary, Err(BatchError::ItemFailed { id, source }));
                }
            }
        }
        (summary, Ok(items))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemhub_common::ItemStatus;

    fn processed(id: ItemId) -> ItemOutcome {
        ItemOutcome::Processed(
            Item::new("item", "", "a@example.com")
                .with_id(id)
                .with_status(ItemStatus::Processed),
        )
    }

    #[test]
    fn test_empty_run_completes_with_no_items() {
        let run = BatchRun::start(Uuid::new_v4(), vec![]);
        assert!(run.is_settled());
        let (summary, result) = run.finish();
        assert_eq!(summary.state, BatchState::Completed);
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_items_follow_completion_order() {
        let mut run = BatchRun::start(Uuid::new_v4(), vec![1, 2, 3]);
        run.record(3, processed(3));
        run.record(1, processed(1));
        run.record(2, processed(2));

        let (summary, result) = run.finish();
        let ids: Vec<_> = result.unwrap().iter().map(|i| i.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(summary.processed, 3);
    }

    #[test]
    fn test_missing_items_are_dropped() {
        let mut run = BatchRun::start(Uuid::new_v4(), vec![1, 2]);
        run.record(2, ItemOutcome::Missing);
        run.record(1, processed(1));

        let (summary, result) = run.finish();
        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.missing, 1);
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_first_failure_in_completion_order_fails_run() {
        let mut run = BatchRun::start(Uuid::new_v4(), vec![1, 2, 3]);
        run.record(1, processed(1));
        run.record(3, ItemOutcome::Failed(ProcessError::Interrupted));
        run.record(2, ItemOutcome::Failed(ProcessError::NotScheduled));

        let (summary, result) = run.finish();
        assert_eq!(summary.state, BatchState::Failed);
        assert_eq!(summary.failed, 2);
        match result {
            Err(BatchError::ItemFailed { id, source }) => {
                assert_eq!(id, 3);
                assert!(matches!(source, ProcessError::Interrupted));
            }
            other => panic!("Expected ItemFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_outcome_is_ignored() {
        let mut run = BatchRun::start(Uuid::new_v4(), vec![1]);
        run.record(1, processed(1));
        run.record(1, ItemOutcome::Failed(ProcessError::Interrupted));
        assert!(matches!(run.outcome(1), Some(ItemOutcome::Processed(_))));
    }

    #[test]
    fn test_unsettled_run_is_abandoned() {
        let mut run = BatchRun::start(Uuid::new_v4(), vec![1, 2]);
        run.record(1, processed(1));
        assert!(!run.is_settled());
        let (summary, result) = run.finish();
        assert_eq!(summary.state, BatchState::Failed);
        assert!(matches!(result, Err(BatchError::Abandoned)));
    }
}
