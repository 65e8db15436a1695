//! Database initialization command - `itemhub init`.

use anyhow::{Context, Result};
use itemhub::config::ServiceConfig;
use itemhub::store::SqliteItemStore;

pub fn cmd_init(config: &ServiceConfig) -> Result<()> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    SqliteItemStore::open(db_path)?;
    println!("Item database initialized at {}", db_path.display());
    Ok(())
}
