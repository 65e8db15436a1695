//! Shared domain types for the itemhub service.
//!
//! The `Item` record and its status live here so both the service crate and
//! any client tooling agree on the wire format.

pub mod item;

pub use item::{Item, ItemId, ItemStatus, ValidationErrors};
