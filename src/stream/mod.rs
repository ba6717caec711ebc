//! Outward event stream for a run.
//!
//! The engine emits [`RunEvent`]s through an [`EventEmitter`] in production
//! order. Callers either forward them as they arrive ([`event_stream`]) or
//! buffer them until the terminal event ([`collect`]).

use crate::agents::AgentId;
use crate::tools::ToolId;
use crate::workflow::{Artifacts, EngineErrorKind, ToolOutcome};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

/// One event of a run, numbered from 0 without gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: Uuid,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RunEventKind {
    RunStarted {
        agent: AgentId,
    },
    AgentSwitched {
        from: AgentId,
        to: AgentId,
    },
    ToolCalled {
        agent: AgentId,
        call_id: String,
        tool: ToolId,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        tool: ToolId,
        outcome: ToolOutcome,
    },
    TextDelta {
        agent: AgentId,
        text: String,
    },
    RunCompleted {
        output: String,
        artifacts: Artifacts,
    },
    RunFailed {
        error: EngineErrorKind,
        message: String,
    },
}

impl RunEventKind {
    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            RunEventKind::RunStarted { .. } => "run-started",
            RunEventKind::AgentSwitched { .. } => "agent-switched",
            RunEventKind::ToolCalled { .. } => "tool-called",
            RunEventKind::ToolResult { .. } => "tool-result",
            RunEventKind::TextDelta { .. } => "text-delta",
            RunEventKind::RunCompleted { .. } => "run-completed",
            RunEventKind::RunFailed { .. } => "run-failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEventKind::RunCompleted { .. } | RunEventKind::RunFailed { .. }
        )
    }
}

/// Stamps events with the run id and the next sequence number.
///
/// Owned by the run's single execution path, so numbering needs no atomics.
pub struct EventEmitter {
    run_id: Uuid,
    next_seq: u64,
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventEmitter {
    pub fn new(run_id: Uuid, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            run_id,
            next_seq: 0,
            tx,
        }
    }

    /// Emit an event. Never blocks; a dropped receiver is not an error.
    pub fn emit(&mut self, kind: RunEventKind) {
        let event = RunEvent {
            run_id: self.run_id,
            seq: self.next_seq,
            timestamp: Utc::now(),
            kind,
        };
        self.next_seq += 1;

        if self.tx.send(event).is_err() {
            debug!("Event receiver for run {} is gone", self.run_id);
        }
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }
}

/// Incremental delivery: events as the engine produces them.
pub fn event_stream(rx: mpsc::UnboundedReceiver<RunEvent>) -> impl Stream<Item = RunEvent> {
    UnboundedReceiverStream::new(rx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Completed,
    Failed,
    /// The channel closed before a terminal event arrived.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub kind: EngineErrorKind,
    pub message: String,
}

/// Buffered delivery: everything up to and including the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRun {
    pub run_id: Uuid,
    pub status: AggregateStatus,
    pub output: Option<String>,
    pub error: Option<FailureSummary>,
    #[serde(flatten)]
    pub artifacts: Artifacts,
    pub events: Vec<RunEvent>,
}

/// Buffer events until the terminal one and fold them into a single result.
pub async fn collect(run_id: Uuid, rx: mpsc::UnboundedReceiver<RunEvent>) -> AggregatedRun {
    let mut stream = event_stream(rx);
    let mut run = AggregatedRun {
        run_id,
        status: AggregateStatus::Incomplete,
        output: None,
        error: None,
        artifacts: Artifacts::default(),
        events: Vec::new(),
    };

    while let Some(event) = stream.next().await {
        let terminal = event.kind.is_terminal();
        match &event.kind {
            RunEventKind::RunCompleted { output, artifacts } => {
                run.status = AggregateStatus::Completed;
                run.output = Some(output.clone());
                run.artifacts = artifacts.clone();
            }
            RunEventKind::RunFailed { error, message } => {
                run.status = AggregateStatus::Failed;
                run.error = Some(FailureSummary {
                    kind: *error,
                    message: message.clone(),
                });
            }
            _ => {}
        }
        run.events.push(event);
        if terminal {
            break;
        }
    }

    run
}
