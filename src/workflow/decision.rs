//! The seam between the engine and whatever reasons on behalf of an agent.

use super::transcript::Transcript;
use super::EngineError;
use crate::agents::{AgentId, AgentSpec};
use crate::tools::ToolId;
use async_trait::async_trait;

/// What the active agent wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Speak. Completes the run when the agent is terminal.
    Text(String),
    /// Call a tool with raw JSON arguments, as produced by the model.
    UseTool {
        call_id: String,
        tool: ToolId,
        arguments: String,
    },
    /// Transfer control to another agent.
    Handoff { target: AgentId },
}

/// Produces exactly one decision per call for the given agent.
///
/// Implementations receive the whole transcript. Any truncation must be
/// explicitly configured on the implementation itself.
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, agent: &AgentSpec, transcript: &Transcript) -> Result<Decision, EngineError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! A decider that replays a fixed script, plus small graphs to run it on.

    use super::*;
    use crate::agents::{AgentGraph, CompletionGuard};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub fn text(s: &str) -> Decision {
        Decision::Text(s.to_string())
    }

    pub fn tool(tool: ToolId, arguments: &str) -> Decision {
        Decision::UseTool {
            call_id: String::new(),
            tool,
            arguments: arguments.to_string(),
        }
    }

    pub fn handoff(target: &str) -> Decision {
        Decision::Handoff {
            target: AgentId::from(target),
        }
    }

    /// Replays decisions in order. Tool calls get ids `call-<n>`.
    #[derive(Default)]
    pub struct ScriptedDecider {
        script: Mutex<VecDeque<Decision>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        pub seen: Mutex<Vec<(AgentId, usize)>>,
    }

    impl ScriptedDecider {
        pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Default::default()
            }
        }

        /// Sleep before answering each call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Decider for ScriptedDecider {
        async fn decide(&self, agent: &AgentSpec, transcript: &Transcript) -> Result<Decision, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen
                .lock()
                .unwrap()
                .push((agent.id().clone(), transcript.len()));

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Decision::UseTool { tool, arguments, .. }) => Ok(Decision::UseTool {
                    call_id: format!("call-{}", n),
                    tool,
                    arguments,
                }),
                Some(decision) => Ok(decision),
                None => Err(EngineError::DecisionFailed {
                    agent: agent.id().clone(),
                    message: "script exhausted".to_string(),
                }),
            }
        }
    }

    /// A linear path `agent-0 → agent-1 → … → agent-<n-1>` with no tools.
    pub fn linear_graph(n: usize) -> AgentGraph {
        let specs = (0..n)
            .map(|i| {
                let spec = AgentSpec::new(format!("agent-{}", i).as_str(), format!("Agent {}", i), "");
                if i + 1 < n {
                    spec.with_handoff(format!("agent-{}", i + 1).as_str())
                } else {
                    spec
                }
            })
            .collect();
        AgentGraph::new("agent-0", specs).unwrap()
    }

    /// `writer → producer → summary` where only the producer may render video
    /// and the run must render one before it can finish.
    pub fn production_graph() -> AgentGraph {
        AgentGraph::new(
            "writer",
            vec![
                AgentSpec::new("writer", "Writer", "Write a script.").with_handoff("producer"),
                AgentSpec::new("producer", "Producer", "Render the video.")
                    .with_tool(ToolId::GenerateVideo)
                    .with_handoff("summary"),
                AgentSpec::new("summary", "Summary", "Summarize."),
            ],
        )
        .unwrap()
        .with_guard(CompletionGuard::require([ToolId::GenerateVideo]))
    }

    /// Two agents handing off to each other forever.
    pub fn cyclic_graph() -> AgentGraph {
        AgentGraph::new(
            "ping",
            vec![
                AgentSpec::new("ping", "Ping", "").with_handoff("pong"),
                AgentSpec::new("pong", "Pong", "").with_handoff("ping"),
            ],
        )
        .unwrap()
    }
}
