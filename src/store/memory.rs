use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use itemhub_common::{Item, ItemId};

use super::ItemStore;
use crate::errors::StoreError;

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<ItemId, Item>,
    last_id: ItemId,
}

/// In-process item store. Identifiers start at 1 and are never reused.
#[derive(Default)]
pub struct MemoryItemStore {
    state: Mutex<MemoryState>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn list_all(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.lock()?.items.values().cloned().collect())
    }

    async fn list_ids(&self) -> Result<Vec<ItemId>, StoreError> {
        Ok(self.lock()?.items.keys().copied().collect())
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.lock()?.items.get(&id).cloned())
    }

    async fn save(&self, mut item: Item) -> Result<Item, StoreError> {
        let mut state = self.lock()?;
        let id = match item.id {
            Some(id) => {
                state.last_id = state.last_id.max(id);
                id
            }
            None => {
                state.last_id += 1;
                state.last_id
            }
        };
        item.id = Some(id);
        state.items.insert(id, item.clone());
        Ok(item)
    }

    async fn delete_by_id(&self, id: ItemId) -> Result<(), StoreError> {
        self.lock()?.items.remove(&id);
        Ok(())
    }
}
