//! SQLite-backed store compatible with the charmhelpers `unitdata` schema
//!
//! Existing units keep their relation data in `$CHARM_DIR/.unit-state.db`,
//! a table `kv(key, data)` whose `data` column holds JSON text. Opening the
//! same file here lets an upgraded charm pick up where the old one left off.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{ConfigStore, StoreResult};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT,
    data TEXT,
    PRIMARY KEY (key)
)";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl ConfigStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match data {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        let data = serde_json::to_string(&value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, data) VALUES (?1, ?2)",
            params![key, data],
        )?;
        Ok(())
    }

    fn unset(&mut self, key: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
