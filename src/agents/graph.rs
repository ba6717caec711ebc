//! The agent graph: nodes are agent specs, edges are declared handoffs.

use super::{AgentId, AgentSpec};
use crate::config::{Prompts, Settings};
use crate::error::{Result, ShipShowError};
use crate::tools::ToolId;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

/// Precondition on finishing a run: tools that must have succeeded at least once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionGuard {
    required_tools: BTreeSet<ToolId>,
}

impl CompletionGuard {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn require(tools: impl IntoIterator<Item = ToolId>) -> Self {
        Self {
            required_tools: tools.into_iter().collect(),
        }
    }

    pub fn required_tools(&self) -> &BTreeSet<ToolId> {
        &self.required_tools
    }

    /// Required tools that have not succeeded yet.
    pub fn missing(&self, succeeded: &BTreeSet<ToolId>) -> Vec<ToolId> {
        self.required_tools.difference(succeeded).copied().collect()
    }
}

/// Validated, immutable agent graph shared by all runs.
#[derive(Debug, Clone)]
pub struct AgentGraph {
    order: Vec<AgentId>,
    agents: HashMap<AgentId, Arc<AgentSpec>>,
    start: AgentId,
    guard: CompletionGuard,
}

impl AgentGraph {
    /// Build a graph, checking that ids are unique, the start agent exists and
    /// every handoff target is a known agent. Cycles are allowed.
    pub fn new(start: impl Into<AgentId>, specs: Vec<AgentSpec>) -> Result<Self> {
        let start = start.into();
        let mut order = Vec::with_capacity(specs.len());
        let mut agents = HashMap::with_capacity(specs.len());

        for spec in specs {
            let id = spec.id().clone();
            if agents.insert(id.clone(), Arc::new(spec)).is_some() {
                return Err(ShipShowError::AgentGraph(format!("Duplicate agent id: {}", id)));
            }
            order.push(id);
        }

        if !agents.contains_key(&start) {
            return Err(ShipShowError::AgentGraph(format!("Unknown start agent: {}", start)));
        }

        for spec in agents.values() {
            if let Some(target) = spec.allowed_handoffs().iter().find(|t| !agents.contains_key(*t)) {
                return Err(ShipShowError::AgentGraph(format!(
                    "Agent {} hands off to unknown agent {}",
                    spec.id(),
                    target
                )));
            }
        }

        let graph = Self {
            order,
            agents,
            start,
            guard: CompletionGuard::none(),
        };

        let reachable = graph.reachable();
        for id in &graph.order {
            if !reachable.contains(id) {
                warn!("Agent {} is not reachable from {}", id, graph.start);
            }
        }

        Ok(graph)
    }

    /// Set the precondition checked before a terminal agent may finish.
    pub fn with_guard(mut self, guard: CompletionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The default marketing pipeline:
    /// coordinator → market_research → creative_director → copywriter →
    /// voiceover_producer → video_producer → summary.
    pub fn marketing_pipeline(prompts: &Prompts) -> Result<Self> {
        let p = &prompts.agents;
        let specs = vec![
            AgentSpec::new("coordinator", "ShipShow Coordinator", prompts.render_with_custom(&p.coordinator))
                .with_handoff("market_research"),
            AgentSpec::new("market_research", "Market Researcher", prompts.render_with_custom(&p.market_research))
                .with_tool(ToolId::OpenLink)
                .with_handoff("creative_director"),
            AgentSpec::new("creative_director", "Creative Director", prompts.render_with_custom(&p.creative_director))
                .with_tool(ToolId::OpenLink)
                .with_handoff("copywriter"),
            AgentSpec::new("copywriter", "Copywriter", prompts.render_with_custom(&p.copywriter))
                .with_handoff("voiceover_producer"),
            AgentSpec::new("voiceover_producer", "Voiceover Producer", prompts.render_with_custom(&p.voiceover_producer))
                .with_tool(ToolId::GenerateAudio)
                .with_handoff("video_producer"),
            AgentSpec::new("video_producer", "Video Producer", prompts.render_with_custom(&p.video_producer))
                .with_tool(ToolId::GenerateVideo)
                .with_handoff("summary"),
            AgentSpec::new("summary", "Delivery Lead", prompts.render_with_custom(&p.summary)),
        ];

        Self::new("coordinator", specs)
    }

    /// Build the marketing pipeline with prompts, start agent and guard from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let pipeline = Self::marketing_pipeline(&prompts)?;
        let specs = pipeline
            .order
            .iter()
            .filter_map(|id| pipeline.agents.get(id))
            .map(|spec| spec.as_ref().clone())
            .collect();

        let graph = Self::new(settings.workflow.start_agent.as_str(), specs)?
            .with_guard(CompletionGuard::require(settings.workflow.required_tools.iter().copied()));

        info!(
            "Loaded agent graph with {} agents starting at {}",
            graph.len(),
            graph.start()
        );
        Ok(graph)
    }

    pub fn start(&self) -> &AgentId {
        &self.start
    }

    pub fn guard(&self) -> &CompletionGuard {
        &self.guard
    }

    pub fn get(&self, id: &AgentId) -> Option<&Arc<AgentSpec>> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Agents in declaration order.
    pub fn agents(&self) -> impl Iterator<Item = &Arc<AgentSpec>> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// Agents reachable from the start agent via handoff edges.
    pub fn reachable(&self) -> BTreeSet<AgentId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([self.start.clone()]);

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(spec) = self.agents.get(&id) {
                queue.extend(spec.allowed_handoffs().iter().cloned());
            }
        }

        seen
    }
}
