//! Fault-injecting store used by the batch and API tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use itemhub_common::{Item, ItemId};
use tokio::sync::Notify;

use super::{ItemStore, MemoryItemStore};
use crate::errors::StoreError;

/// Wraps a `MemoryItemStore` and fails or stalls on chosen operations.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    inner: MemoryItemStore,
    fail_lookup: Mutex<HashSet<ItemId>>,
    fail_save: Mutex<HashSet<ItemId>>,
    fail_listing: Mutex<bool>,
    lookup_delay: Mutex<Option<Duration>>,
    /// Ids reported by `list_ids` on top of the stored ones.
    phantom_ids: Mutex<Vec<ItemId>>,
    pub lookup_started: Notify,
    pub lookups: AtomicUsize,
    pub saves: AtomicUsize,
    pub listings: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, item: Item) -> Item {
        self.inner.save(item).await.unwrap()
    }

    pub async fn stored(&self, id: ItemId) -> Option<Item> {
        self.inner.find_by_id(id).await.unwrap()
    }

    pub fn fail_lookup_of(&self, id: ItemId) {
        self.fail_lookup.lock().unwrap().insert(id);
    }

    pub fn fail_save_of(&self, id: ItemId) {
        self.fail_save.lock().unwrap().insert(id);
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_phantom_id(&self, id: ItemId) {
        self.phantom_ids.lock().unwrap().push(id);
    }
}

fn injected(what: &str, id: ItemId) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("injected {} failure for item {}", what, id))
}

#[async_trait]
impl ItemStore for ScriptedStore {
    async fn list_all(&self) -> Result<Vec<Item>, StoreError> {
        self.inner.list_all().await
    }

    async fn list_ids(&self) -> Result<Vec<ItemId>, StoreError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.lock().unwrap() {
            return Err(StoreError::Backend(anyhow::anyhow!("injected listing failure")));
        }
        let mut ids = self.inner.list_ids().await?;
        ids.extend(self.phantom_ids.lock().unwrap().iter().copied());
        Ok(ids)
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.lookup_started.notify_one();
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookup.lock().unwrap().contains(&id) {
            return Err(injected("lookup", id));
        }
        self.inner.find_by_id(id).await
    }

    async fn save(&self, item: Item) -> Result<Item, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = item.id {
            if self.fail_save.lock().unwrap().contains(&id) {
                return Err(injected("save", id));
            }
        }
        self.inner.save(item).await
    }

    async fn delete_by_id(&self, id: ItemId) -> Result<(), StoreError> {
        self.inner.delete_by_id(id).await
    }
}
