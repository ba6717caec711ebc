//! The append-only record of everything that happened in a run.

use crate::agents::AgentId;
use crate::tools::{ToolError, ToolId, ToolOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of one tool invocation as recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: ToolOutput },
    Failure { error: ToolError },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// Text handed back to the model.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Success { output } => {
                serde_json::to_string(output).unwrap_or_else(|e| format!("Unserializable output: {}", e))
            }
            ToolOutcome::Failure { error } => format!("Tool error ({}): {}", error.kind, error.message),
        }
    }
}

impl From<Result<ToolOutput, ToolError>> for ToolOutcome {
    fn from(result: Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(output) => ToolOutcome::Success { output },
            Err(error) => ToolOutcome::Failure { error },
        }
    }
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    UserMessage {
        text: String,
    },
    AgentMessage {
        agent: AgentId,
        text: String,
    },
    ToolCall {
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
    Handoff {
        from: AgentId,
        to: AgentId,
    },
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the engine appends.
    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Tools with at least one successful result.
    pub fn succeeded_tools(&self) -> BTreeSet<ToolId> {
        self.turns
            .iter()
            .filter_map(|turn| match turn {
                Turn::ToolResult { tool, outcome, .. } if outcome.is_success() => Some(*tool),
                _ => None,
            })
            .collect()
    }

    /// Number of handoffs so far.
    pub fn handoff_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, Turn::Handoff { .. }))
            .count()
    }

    /// Agents in the order they held control, starting with `start`.
    pub fn agent_path(&self, start: &AgentId) -> Vec<AgentId> {
        let mut path = vec![start.clone()];
        path.extend(self.turns.iter().filter_map(|t| match t {
            Turn::Handoff { to, .. } => Some(to.clone()),
            _ => None,
        }));
        path
    }

    /// The most recent text spoken by `agent`.
    pub fn last_message_from(&self, agent: &AgentId) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::AgentMessage { agent: a, text } if a == agent => Some(text.as_str()),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;

    fn video_result(ok: bool) -> Turn {
        let outcome = if ok {
            ToolOutcome::Success {
                output: ToolOutput::Video {
                    video_url: "https://cdn.example.com/v.mp4".to_string(),
                    duration_seconds: 30.0,
                    platform: None,
                },
            }
        } else {
            ToolOutcome::Failure {
                error: ToolError::unavailable("down"),
            }
        };
        Turn::ToolResult {
            call_id: "call-1".to_string(),
            tool: ToolId::GenerateVideo,
            outcome,
        }
    }

    #[test]
    fn test_failed_results_do_not_count_as_succeeded() {
        let mut transcript = Transcript::new();
        transcript.push(video_result(false));
        assert!(transcript.succeeded_tools().is_empty());

        transcript.push(video_result(true));
        assert_eq!(
            transcript.succeeded_tools(),
            BTreeSet::from([ToolId::GenerateVideo])
        );
    }

    #[test]
    fn test_agent_path_and_last_message() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::UserMessage { text: "hi".to_string() });
        transcript.push(Turn::AgentMessage {
            agent: AgentId::from("a"),
            text: "first".to_string(),
        });
        transcript.push(Turn::AgentMessage {
            agent: AgentId::from("a"),
            text: "second".to_string(),
        });
        transcript.push(Turn::Handoff {
            from: AgentId::from("a"),
            to: AgentId::from("b"),
        });

        assert_eq!(
            transcript.agent_path(&AgentId::from("a")),
            vec![AgentId::from("a"), AgentId::from("b")]
        );
        assert_eq!(transcript.last_message_from(&AgentId::from("a")), Some("second"));
        assert_eq!(transcript.last_message_from(&AgentId::from("b")), None);
        assert_eq!(transcript.handoff_count(), 1);
    }

    #[test]
    fn test_turn_json_shape() {
        let turn = Turn::Handoff {
            from: AgentId::from("copywriter"),
            to: AgentId::from("voiceover_producer"),
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["type"], "handoff");
        assert_eq!(json["to"], "voiceover_producer");

        let rendered = match video_result(false) {
            Turn::ToolResult { outcome, .. } => outcome.render(),
            _ => unreachable!(),
        };
        assert_eq!(rendered, "Tool error (upstream_unavailable): down");
    }
}
