//! Agent definitions.
//!
//! An agent is data only: a role name, natural-language instructions, the
//! tools it may call and the agents it may hand off to. Specs are built once
//! at process start and shared read-only by every run.

mod graph;

pub use graph::{AgentGraph, CompletionGuard};

use crate::tools::ToolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of an agent in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Immutable definition of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSpec {
    id: AgentId,
    name: String,
    instructions: String,
    allowed_tools: BTreeSet<ToolId>,
    allowed_handoffs: BTreeSet<AgentId>,
}

impl AgentSpec {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
            allowed_tools: BTreeSet::new(),
            allowed_handoffs: BTreeSet::new(),
        }
    }

    /// Grant a tool.
    pub fn with_tool(mut self, tool: ToolId) -> Self {
        self.allowed_tools.insert(tool);
        self
    }

    /// Declare a legal handoff target.
    pub fn with_handoff(mut self, target: impl Into<AgentId>) -> Self {
        self.allowed_handoffs.insert(target.into());
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn allowed_tools(&self) -> &BTreeSet<ToolId> {
        &self.allowed_tools
    }

    pub fn allowed_handoffs(&self) -> &BTreeSet<AgentId> {
        &self.allowed_handoffs
    }

    pub fn can_use(&self, tool: ToolId) -> bool {
        self.allowed_tools.contains(&tool)
    }

    pub fn can_hand_off_to(&self, target: &AgentId) -> bool {
        self.allowed_handoffs.contains(target)
    }

    /// A terminal agent cannot hand off; its final text completes the run.
    pub fn is_terminal(&self) -> bool {
        self.allowed_handoffs.is_empty()
    }
}
