use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use itemhub_common::{Item, ItemId, ItemStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::ItemStore;
use crate::errors::StoreError;

/// SQLite-backed item store.
///
/// Wraps the connection behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. A statement that has started always runs to
/// completion even if the awaiting future is dropped.
#[derive(Clone)]
pub struct SqliteItemStore {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteItemStore {
    /// Open (or create) a SQLite database at the given path and create the schema.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'NEW',
                email TEXT NOT NULL DEFAULT ''
            );
            ",
        )
        .context("Failed to create items table")?;
        Ok(Self {
            inner: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure with access to the connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(StoreError::TaskFailed)?
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let status: String = row.get(3)?;
    Ok(Item {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        status: ItemStatus::from(status),
        email: row.get(4)?,
    })
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn list_all(&self) -> Result<Vec<Item>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, status, email FROM items ORDER BY id",
            )?;
            let items = stmt
                .query_map([], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn list_ids(&self) -> Result<Vec<ItemId>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM items ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<ItemId>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT id, name, description, status, email FROM items WHERE id = ?1",
                params![id],
                item_from_row,
            )
            .optional()
        })
        .await
    }

    async fn save(&self, item: Item) -> Result<Item, StoreError> {
        self.call(move |conn| {
            let mut item = item;
            match item.id {
                None => {
                    conn.execute(
                        "INSERT INTO items (name, description, status, email) VALUES (?1, ?2, ?3, ?4)",
                        params![item.name, item.description, item.status.as_str(), item.email],
                    )?;
                    item.id = Some(conn.last_insert_rowid());
                }
                Some(id) => {
                    conn.execute(
                        "INSERT INTO items (id, name, description, status, email)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(id) DO UPDATE SET
                            name = excluded.name,
                            description = excluded.description,
                            status = excluded.status,
                            email = excluded.email",
                        params![id, item.name, item.description, item.status.as_str(), item.email],
                    )?;
                }
            }
            Ok(item)
        })
        .await
    }

    async fn delete_by_id(&self, id: ItemId) -> Result<(), StoreError> {
        self.call(move |conn| {
            conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}
