use crate::error::Result;
use crate::storage::{StorageKey, StoragePort};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StoragePort for MemoryStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<()> {
        self.entries.write().insert(key.clone(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        let ticket = StorageKey::new("lottery", "ticket_number");
        let other = StorageKey::new("admin", "ticket_number");

        store.set(&ticket, "42").unwrap();
        assert_eq!(store.get(&ticket).unwrap().as_deref(), Some("42"));
        assert_eq!(store.get(&other).unwrap(), None);

        store.remove(&ticket).unwrap();
        store.remove(&ticket).unwrap();
        assert!(store.is_empty());
    }
}
