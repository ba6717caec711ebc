//! SQLite-backed run log.

use super::{RunRecord, RunStore};
use crate::error::{Result, ShipShowError};
use crate::workflow::EngineErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    error_kind TEXT,
    output TEXT NOT NULL,
    transcript_json TEXT NOT NULL,
    artifacts_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at);
"#;

pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open or create the run log at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened run log at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory run log for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ShipShowError::Audit(format!("Failed to acquire lock: {}", e)))
    }

    fn parse_time(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        let run_id: String = row.get(0)?;
        let error_kind: Option<String> = row.get(2)?;
        let started_at: String = row.get(6)?;
        let finished_at: String = row.get(7)?;

        Ok(RunRecord {
            run_id: Uuid::parse_str(&run_id).unwrap_or_else(|_| Uuid::nil()),
            status: row.get(1)?,
            error_kind: error_kind
                .and_then(|k| serde_json::from_value::<EngineErrorKind>(serde_json::Value::String(k)).ok()),
            output: row.get(3)?,
            transcript_json: row.get(4)?,
            artifacts_json: row.get(5)?,
            started_at: Self::parse_time(&started_at),
            finished_at: Self::parse_time(&finished_at),
        })
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    #[instrument(skip(self, record), fields(run_id = %record.run_id))]
    async fn save(&self, record: &RunRecord) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO runs
            (run_id, status, error_kind, output, transcript_json, artifacts_json, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.run_id.to_string(),
                record.status,
                record.error_kind.map(|k| k.as_str()),
                record.output,
                record.transcript_json,
                record.artifacts_json,
                record.started_at.to_rfc3339(),
                record.finished_at.to_rfc3339(),
            ],
        )?;

        debug!("Saved run {} ({})", record.run_id, record.status);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let conn = self.lock()?;

        let record = conn.query_row(
            r#"
            SELECT run_id, status, error_kind, output, transcript_json, artifacts_json,
                   started_at, finished_at
            FROM runs
            WHERE run_id = ?1
            "#,
            params![run_id.to_string()],
            Self::from_row,
        );

        match record {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, status, error_kind, output, transcript_json, artifacts_json,
                   started_at, finished_at
            FROM runs
            ORDER BY finished_at DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt.query_map(params![limit as i64], Self::from_row)?;
        Ok(records.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: &str, finished_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            run_id: Uuid::new_v4(),
            status: status.to_string(),
            error_kind: (status == "failed").then_some(EngineErrorKind::MandatoryStepMissing),
            output: "done".to_string(),
            transcript_json: "[]".to_string(),
            artifacts_json: r#"{"scripts":{},"audio":{},"video":{}}"#.to_string(),
            started_at: finished_at - Duration::seconds(5),
            finished_at,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = SqliteRunStore::in_memory().unwrap();
        let failed = record("failed", Utc::now());
        store.save(&failed).await.unwrap();

        let loaded = store.get(failed.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, "failed");
        assert_eq!(loaded.error_kind, Some(EngineErrorKind::MandatoryStepMissing));
        assert!(!loaded.is_completed());

        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = SqliteRunStore::in_memory().unwrap();
        let now = Utc::now();
        let older = record("completed", now - Duration::minutes(10));
        let newer = record("completed", now);
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let runs = store.list(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, newer.run_id);

        assert_eq!(store.list(1).await.unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");
        SqliteRunStore::new(&path).unwrap();
        assert!(path.exists());
    }
}
