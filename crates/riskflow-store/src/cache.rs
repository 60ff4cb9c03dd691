use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use riskflow_config::RISKFLOW_DIR_NAME;
use riskflow_core::ChecklistRecord;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

pub const CACHE_FILE_NAME: &str = "cache.sqlite";
pub const CHECKLIST_CACHE_SLOT: &str = "checklist_cache_v1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Last successfully fetched record list, kept so the checklist can be shown
/// before the first fetch completes.
pub struct SnapshotCache {
    conn: Connection,
    path: PathBuf,
}

impl SnapshotCache {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, CacheError> {
        let riskflow_dir = workspace_root.as_ref().join(RISKFLOW_DIR_NAME);
        fs::create_dir_all(&riskflow_dir)?;

        let path = riskflow_dir.join(CACHE_FILE_NAME);
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a slot. Content that no longer decodes is logged and treated as
    /// absent.
    pub fn load(&self, slot: &str) -> Result<Option<Vec<ChecklistRecord>>, CacheError> {
        let Some(raw) = self.load_raw(slot)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Vec<ChecklistRecord>>(&raw) {
            Ok(records) => Ok(Some(records)),
            Err(err) => {
                tracing::warn!(slot, error = %err, "ignoring corrupt cache slot");
                Ok(None)
            }
        }
    }

    pub fn store(&self, slot: &str, records: &[ChecklistRecord]) -> Result<(), CacheError> {
        let value = serde_json::to_string(records)?;
        self.store_raw(slot, &value)
    }

    pub fn clear(&self, slot: &str) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM kv_slots WHERE slot = ?1", params![slot])?;
        Ok(())
    }

    pub fn updated_at(&self, slot: &str) -> Result<Option<i64>, CacheError> {
        let updated_at = self
            .conn
            .query_row(
                "SELECT updated_at FROM kv_slots WHERE slot = ?1",
                params![slot],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated_at)
    }

    fn load_raw(&self, slot: &str) -> Result<Option<String>, CacheError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_slots WHERE slot = ?1",
                params![slot],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn store_raw(&self, slot: &str, value: &str) -> Result<(), CacheError> {
        self.conn.execute(
            r#"
            INSERT INTO kv_slots (slot, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(slot) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![slot, value, current_unix_timestamp_millis()],
        )?;
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_slots (
            slot TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
