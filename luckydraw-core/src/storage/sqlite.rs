use crate::error::{LuckyDrawError, Result};
use crate::storage::{StorageKey, StoragePort};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Device-local store backed by a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LuckyDrawError::internal(format!("Failed to create directory: {}", e))
            })?;
        }

        let store = Self {
            conn: Mutex::new(Connection::open(db_path)?),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, name)
            )",
            [],
        )?;

        Ok(())
    }
}

impl StoragePort for SqliteStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND name = ?2",
                params![key.namespace, key.name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (namespace, name, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.namespace, key.name, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND name = ?2",
            params![key.namespace, key.name],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("luckydraw.db");
        let key = StorageKey::new("lottery", "ticket_number");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(&key, "17").unwrap();
            store.set(&key, "18").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("18"));

        store.remove(&key).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
    }
}
