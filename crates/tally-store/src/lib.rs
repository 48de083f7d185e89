//! Tally Store: the inventory boundary.
//!
//! The discovery engine never touches storage directly; every read and write
//! goes through the [`InventoryStore`] trait. Two backends are provided: an
//! in-memory store for tests and embedding, and a JSON-file store used by the
//! command-line tool.

pub mod error;
pub mod file;
pub mod inventory;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use inventory::Inventory;
pub use memory::MemoryStore;
pub use store::{InventoryStore, ResolveScope};
