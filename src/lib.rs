pub mod batch;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod server;
pub mod service;
pub mod store;

pub use itemhub_common::{Item, ItemId, ItemStatus, ValidationErrors};
