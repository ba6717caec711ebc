//! Persistent log of finished runs.

mod sqlite;

pub use sqlite::SqliteRunStore;

use crate::error::Result;
use crate::workflow::{EngineErrorKind, RunOutcome, RunStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finished run as stored in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    /// `completed` or `failed`.
    pub status: String,
    pub error_kind: Option<EngineErrorKind>,
    /// Final text, or the error message for failed runs.
    pub output: String,
    /// The full transcript as JSON.
    pub transcript_json: String,
    pub artifacts_json: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_outcome(outcome: &RunOutcome) -> Result<Self> {
        let (status, error_kind, output) = match &outcome.status {
            RunStatus::Completed { output } => ("completed", None, output.clone()),
            RunStatus::Failed { error } => ("failed", Some(error.kind()), error.to_string()),
        };

        Ok(Self {
            run_id: outcome.run_id,
            status: status.to_string(),
            error_kind,
            output,
            transcript_json: serde_json::to_string(&outcome.transcript)?,
            artifacts_json: serde_json::to_string(&outcome.artifacts)?,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Storage for finished runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace a run.
    async fn save(&self, record: &RunRecord) -> Result<()>;

    /// Look up one run.
    async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// Most recent runs first.
    async fn list(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
