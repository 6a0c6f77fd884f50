//! Database connection and key/value operations

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::area::StorageArea;
use crate::migrations::run_migrations;
use crate::Result;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Read one key. Absent keys are `Ok(None)`, never an error.
    pub fn get_item(&self, area: StorageArea, key: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", area.table());
        let raw: Option<String> = self.with_connection(|conn| {
            Ok(conn
                .query_row(&sql, [key], |row| row.get(0))
                .optional()?)
        })?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn set_item(&self, area: StorageArea, key: &str, value: &Value) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)",
            area.table()
        );
        let text = serde_json::to_string(value)?;
        let updated_at = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            conn.execute(&sql, rusqlite::params![key, text, updated_at])?;
            Ok(())
        })?;

        tracing::trace!(area = %area, key = %key, "Stored item");
        Ok(())
    }

    /// Move `previous_key` to `key` with a new value in one transaction.
    /// Either both the delete and the write land or neither does.
    pub fn replace_item(
        &self,
        area: StorageArea,
        previous_key: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        let delete = format!("DELETE FROM {} WHERE key = ?1", area.table());
        let insert = format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)",
            area.table()
        );
        let text = serde_json::to_string(value)?;
        let updated_at = Utc::now().to_rfc3339();

        self.transaction(|tx| {
            tx.execute(&delete, [previous_key])?;
            tx.execute(&insert, rusqlite::params![key, text, updated_at])?;
            Ok(())
        })?;

        tracing::trace!(area = %area, from = %previous_key, to = %key, "Replaced item");
        Ok(())
    }

    /// Remove one key. Returns whether a row existed.
    pub fn remove_item(&self, area: StorageArea, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", area.table());
        let removed = self.with_connection(|conn| Ok(conn.execute(&sql, [key])?))?;
        Ok(removed > 0)
    }

    /// All items whose key starts with `prefix`, ordered by key.
    pub fn items_with_prefix(&self, area: StorageArea, prefix: &str) -> Result<Vec<(String, Value)>> {
        let sql = format!(
            "SELECT key, value FROM {} WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            area.table()
        );

        let rows: Vec<(String, String)> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(key, text)| -> Result<(String, Value)> {
                Ok((key, serde_json::from_str(&text)?))
            })
            .collect()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
