//! SQLite history backend
//!
//! One row per run holding the full JSON record, plus a claims table used for
//! id allocation. Saves are a single upsert, so readers never observe a torn run.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::run_id::is_valid_run_id;
use super::store::{sort_chronologically, HistoryStore};
use crate::error::{Error, Result};
use crate::types::PipelineRun;

/// File name used when the backend is opened from a history directory
pub const DATABASE_FILE: &str = "history.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based run history
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteHistoryStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open history database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };

        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // Other processes may hold the write lock while claiming ids
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Internal(format!("Failed to set busy timeout: {}", e)))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                run_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                failed INTEGER NOT NULL DEFAULT 0,
                record_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_runs_timestamp ON pipeline_runs(timestamp);

            CREATE TABLE IF NOT EXISTS run_claims (
                run_id TEXT PRIMARY KEY,
                claimed_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to create history schema: {}", e)))?;

        Ok(())
    }

    fn decode(run_id: &str, record_json: &str) -> Result<PipelineRun> {
        let value: serde_json::Value = serde_json::from_str(record_json)
            .map_err(|e| Error::invalid_record(run_id, e.to_string()))?;
        let run = PipelineRun::from_value(value)?;
        if run.run_id != run_id {
            return Err(Error::invalid_record(
                run_id,
                format!("record is stored under the wrong id (contains '{}')", run.run_id),
            ));
        }
        Ok(run)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl HistoryStore for SqliteHistoryStore {
    fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    fn claim_run_id(&self, run_id: &str) -> Result<bool> {
        if !is_valid_run_id(run_id) {
            return Err(Error::validation(format!("invalid run id '{}'", run_id)));
        }
        let conn = self.conn.lock();

        let persisted: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM pipeline_runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        if persisted.is_some() {
            return Ok(false);
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO run_claims (run_id, claimed_at) VALUES (?1, ?2)",
            params![run_id, now_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    fn save_run(&self, run: &PipelineRun) -> Result<()> {
        if !is_valid_run_id(&run.run_id) {
            return Err(Error::validation(format!("invalid run id '{}'", run.run_id)));
        }
        run.validate()?;
        let record_json = serde_json::to_string(run)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO pipeline_runs (run_id, timestamp, status, failed, record_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(run_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                status = excluded.status,
                failed = excluded.failed,
                record_json = excluded.record_json,
                updated_at = excluded.updated_at
            "#,
            params![
                run.run_id,
                run.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                run.status.as_str(),
                run.failed as i64,
                record_json,
                now_rfc3339(),
            ],
        )
        .map_err(|e| Error::Internal(format!("Failed to save run {}: {}", run.run_id, e)))?;

        tracing::debug!("Saved run {} to {}", run.run_id, self.location());
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        let conn = self.conn.lock();

        let record_json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM pipeline_runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        record_json
            .map(|json| Self::decode(run_id, &json))
            .transpose()
    }

    fn list_runs(&self) -> Result<Vec<PipelineRun>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT run_id, record_json FROM pipeline_runs")
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut runs: Vec<PipelineRun> = rows
            .into_iter()
            .filter_map(|(run_id, json)| match Self::decode(&run_id, &json) {
                Ok(run) => Some(run),
                Err(e) => {
                    tracing::warn!("Skipping unreadable history record {}: {}", run_id, e);
                    None
                }
            })
            .collect();

        sort_chronologically(&mut runs);
        Ok(runs)
    }
}
