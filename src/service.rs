//! Item service facade shared by the HTTP handlers and the CLI.

use std::sync::Arc;

use itemhub_common::{Item, ItemId};

use crate::batch::{BatchHandle, BatchOrchestrator};
use crate::errors::ServiceError;
use crate::store::ItemStore;

pub struct ItemService {
    store: Arc<dyn ItemStore>,
    orchestrator: BatchOrchestrator,
}

impl ItemService {
    pub fn new(store: Arc<dyn ItemStore>, orchestrator: BatchOrchestrator) -> Self {
        Self { store, orchestrator }
    }

    pub async fn find_all(&self) -> Result<Vec<Item>, ServiceError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn find_by_id(&self, id: ItemId) -> Result<Item, ServiceError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::ItemNotFound { id })
    }

    /// Validate and persist a new item. Any identifier sent by the client is
    /// ignored; storage assigns one.
    pub async fn create(&self, mut item: Item) -> Result<Item, ServiceError> {
        item.validate()?;
        item.id = None;
        let saved = self.store.save(item).await?;
        tracing::debug!(item_id = ?saved.id, "Created item");
        Ok(saved)
    }

    /// Replace an existing item. The path identifier always wins over the body.
    pub async fn update(&self, id: ItemId, mut item: Item) -> Result<Item, ServiceError> {
        item.validate()?;
        if self.store.find_by_id(id).await?.is_none() {
            return Err(ServiceError::ItemNotFound { id });
        }
        item.id = Some(id);
        let saved = self.store.save(item).await?;
        tracing::debug!(item_id = id, "Updated item");
        Ok(saved)
    }

    pub async fn delete(&self, id: ItemId) -> Result<(), ServiceError> {
        if self.store.find_by_id(id).await?.is_none() {
            return Err(ServiceError::ItemNotFound { id });
        }
        self.store.delete_by_id(id).await?;
        tracing::debug!(item_id = id, "Deleted item");
        Ok(())
    }

    /// Start a batch run over every stored item.
    pub async fn process_all(&self) -> BatchHandle {
        self.orchestrator.process_all().await
    }
}
