//! Namespaced key-value persistence for role-local data (tickets, scratch state).
//!
//! Roles depend on [`StoragePort`] rather than a concrete store so the same
//! logic runs against memory in tests and SQLite on a device.

pub mod memory;
pub mod sqlite;
pub mod ticket;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use ticket::TicketStore;

use crate::error::Result;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub namespace: String,
    pub name: String,
}

impl StorageKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.name)
    }
}

pub trait StoragePort: Send + Sync {
    fn get(&self, key: &StorageKey) -> Result<Option<String>>;
    fn set(&self, key: &StorageKey, value: &str) -> Result<()>;
    fn remove(&self, key: &StorageKey) -> Result<()>;
}
