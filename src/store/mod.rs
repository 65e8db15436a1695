//! Storage port consumed by the item service and the batch pipeline.
//!
//! `ItemStore` is the only seam between the core and persistence. Two
//! backends ship with the crate:
//!
//! | Backend            | Use                                           |
//! |--------------------|-----------------------------------------------|
//! | `SqliteItemStore`  | Durable storage, blocking I/O off the runtime |
//! | `MemoryItemStore`  | Tests and `--in-memory` serving               |

use async_trait::async_trait;
use itemhub_common::{Item, ItemId};

use crate::errors::StoreError;

mod memory;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryItemStore;
pub use sqlite::SqliteItemStore;

/// Key-indexed persistence for items.
///
/// Implementations must give read-your-writes consistency per identifier.
/// No ordering is promised for `list_all` or `list_ids`.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Item>, StoreError>;

    async fn list_ids(&self) -> Result<Vec<ItemId>, StoreError>;

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Persist an item. Assigns an identifier when `item.id` is `None`,
    /// otherwise overwrites the record with that identifier.
    async fn save(&self, item: Item) -> Result<Item, StoreError>;

    /// Remove an item. Removing an absent identifier is not an error.
    async fn delete_by_id(&self, id: ItemId) -> Result<(), StoreError>;
}
