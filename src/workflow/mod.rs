//! Sequential multi-agent workflow engine.
//!
//! A run starts at the graph's start agent and proceeds one decision at a
//! time. The active agent either speaks, calls one of its tools, or hands
//! off to one of its declared targets. Tool failures are fed back to the same
//! agent; violations of the graph, the step budget, the completion guard,
//! decision timeouts and cancellation end the run with an [`EngineError`].

mod context;
mod decision;
mod engine;
mod openai;
mod transcript;

pub use context::{Artifacts, RunContext, RunState};
pub use decision::{Decider, Decision};
pub use engine::{EngineConfig, RunHandle, RunOutcome, RunStatus, WorkflowEngine};
pub use openai::OpenAIDecider;
pub use transcript::{ToolOutcome, Transcript, Turn};

#[cfg(test)]
pub(crate) use decision::testing;

use crate::agents::AgentId;
use crate::tools::ToolId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal run failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("Agent {agent} is not allowed to use tool {tool}")]
    UnauthorizedTool { agent: AgentId, tool: String },

    #[error("Agent {from} is not allowed to hand off to {to}")]
    UnauthorizedHandoff { from: AgentId, to: AgentId },

    #[error("Run exceeded its budget of {max_steps} steps")]
    TurnBudgetExceeded { max_steps: usize },

    #[error("Agent {agent} cannot finish the run: {} never succeeded", join_tools(.missing))]
    MandatoryStepMissing { agent: AgentId, missing: Vec<ToolId> },

    #[error("Agent {agent} did not decide within {timeout_secs}s")]
    DecisionTimeout { agent: AgentId, timeout_secs: u64 },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Decision failed for agent {agent}: {message}")]
    DecisionFailed { agent: AgentId, message: String },
}

fn join_tools(tools: &[ToolId]) -> String {
    tools
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Kind of a fatal run failure, without its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    UnauthorizedTool,
    UnauthorizedHandoff,
    TurnBudgetExceeded,
    MandatoryStepMissing,
    DecisionTimeout,
    Cancelled,
    DecisionFailed,
}

impl EngineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineErrorKind::UnauthorizedTool => "unauthorized_tool",
            EngineErrorKind::UnauthorizedHandoff => "unauthorized_handoff",
            EngineErrorKind::TurnBudgetExceeded => "turn_budget_exceeded",
            EngineErrorKind::MandatoryStepMissing => "mandatory_step_missing",
            EngineErrorKind::DecisionTimeout => "decision_timeout",
            EngineErrorKind::Cancelled => "cancelled",
            EngineErrorKind::DecisionFailed => "decision_failed",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::UnauthorizedTool { .. } => EngineErrorKind::UnauthorizedTool,
            EngineError::UnauthorizedHandoff { .. } => EngineErrorKind::UnauthorizedHandoff,
            EngineError::TurnBudgetExceeded { .. } => EngineErrorKind::TurnBudgetExceeded,
            EngineError::MandatoryStepMissing { .. } => EngineErrorKind::MandatoryStepMissing,
            EngineError::DecisionTimeout { .. } => EngineErrorKind::DecisionTimeout,
            EngineError::Cancelled => EngineErrorKind::Cancelled,
            EngineError::DecisionFailed { .. } => EngineErrorKind::DecisionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let err = EngineError::MandatoryStepMissing {
            agent: AgentId::from("summary"),
            missing: vec![ToolId::GenerateVideo],
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "mandatory_step_missing");
        assert_eq!(json["missing"][0], "generate_video");
        assert_eq!(
            err.to_string(),
            "Agent summary cannot finish the run: generate_video never succeeded"
        );
        assert_eq!(err.kind().as_str(), "mandatory_step_missing");
    }
}
