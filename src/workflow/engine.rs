//! The run state machine.

use super::context::{Artifacts, RunContext, RunState};
use super::decision::{Decider, Decision};
use super::openai::OpenAIDecider;
use super::transcript::{ToolOutcome, Transcript, Turn};
use super::EngineError;
use crate::agents::{AgentGraph, AgentId, AgentSpec};
use crate::audit::{RunRecord, RunStore, SqliteRunStore};
use crate::config::{Settings, WorkflowSettings};
use crate::error::{Result, ShipShowError};
use crate::stream::{EventEmitter, RunEvent, RunEventKind};
use crate::tools::{parse_tool_call, ToolId, ToolSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Limits applied to every run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Steps allowed before the run fails with a budget error.
    pub max_steps: usize,
    /// Bounded wait on each decision.
    pub decision_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 40,
            decision_timeout: Duration::from_secs(120),
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            decision_timeout: settings.decision_timeout(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed { output: String },
    Failed { error: EngineError },
}

/// Everything left of a run once it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub status: RunStatus,
    pub transcript: Transcript,
    pub artifacts: Artifacts,
    pub shared_state: BTreeMap<String, serde_json::Value>,
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Completed { output } => Some(output),
            RunStatus::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.status {
            RunStatus::Failed { error } => Some(error),
            RunStatus::Completed { .. } => None,
        }
    }
}

/// A run executing on its own task.
pub struct RunHandle {
    pub run_id: Uuid,
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<RunOutcome>,
}

/// Drives runs over a shared, read-only agent graph and tool set.
pub struct WorkflowEngine {
    graph: Arc<AgentGraph>,
    tools: Arc<ToolSet>,
    decider: Arc<dyn Decider>,
    config: EngineConfig,
    audit: Option<Arc<dyn RunStore>>,
}

impl WorkflowEngine {
    pub fn new(graph: Arc<AgentGraph>, tools: Arc<ToolSet>, decider: Arc<dyn Decider>) -> Self {
        Self {
            graph,
            tools,
            decider,
            config: EngineConfig::default(),
            audit: None,
        }
    }

    /// Build the production engine: the marketing pipeline, real tool
    /// backends, the OpenAI decider and, when enabled, the SQLite run log.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let graph = Arc::new(AgentGraph::from_settings(settings)?);
        let tools = Arc::new(ToolSet::from_settings(settings)?);
        let decider = Arc::new(OpenAIDecider::from_settings(graph.clone(), settings)?);

        let mut engine = Self::new(graph, tools, decider)
            .with_config(EngineConfig::from_settings(&settings.workflow));
        if settings.audit.enabled {
            engine = engine.with_audit(Arc::new(SqliteRunStore::new(&settings.audit_path())?));
        }
        Ok(engine)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Record every finished run in `store`.
    pub fn with_audit(mut self, store: Arc<dyn RunStore>) -> Self {
        self.audit = Some(store);
        self
    }

    pub fn graph(&self) -> &Arc<AgentGraph> {
        &self.graph
    }

    pub fn audit(&self) -> Option<&Arc<dyn RunStore>> {
        self.audit.as_ref()
    }

    /// Create a run context at the start agent with one user turn per input.
    pub fn start(&self, inputs: Vec<String>) -> Result<RunContext> {
        let inputs: Vec<String> = inputs
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .collect();
        if inputs.is_empty() {
            return Err(ShipShowError::InvalidInput(
                "A run needs at least one non-empty user message".to_string(),
            ));
        }

        let mut ctx = RunContext::new(self.graph.start().clone());
        for text in inputs {
            ctx.push(Turn::UserMessage { text });
        }
        Ok(ctx)
    }

    /// Start a run on its own task.
    pub fn spawn(self: &Arc<Self>, inputs: Vec<String>) -> Result<RunHandle> {
        let ctx = self.start(inputs)?;
        let run_id = ctx.run_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let engine = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move { engine.execute(ctx, tx, token).await });

        Ok(RunHandle {
            run_id,
            events: rx,
            cancel,
            join,
        })
    }

    /// Drive a run to its terminal state.
    ///
    /// Exactly one of `run-completed` or `run-failed` is emitted, after the
    /// run has been written to the audit log.
    #[instrument(skip_all, fields(run_id = %ctx.run_id()))]
    pub async fn execute(
        &self,
        mut ctx: RunContext,
        tx: mpsc::UnboundedSender<RunEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut events = EventEmitter::new(ctx.run_id(), tx);
        let start = ctx.current_agent().clone();

        info!("Starting run at agent {}", start);
        ctx.set_state(RunState::Running {
            agent: start.clone(),
        });
        events.emit(RunEventKind::RunStarted { agent: start });

        let result = self.drive(&mut ctx, &mut events, &cancel).await;
        let artifacts = Artifacts::from_transcript(ctx.transcript());

        let status = match result {
            Ok(output) => {
                info!("Run completed after {} steps", ctx.steps());
                ctx.set_state(RunState::Completed);
                RunStatus::Completed { output }
            }
            Err(error) => {
                warn!("Run failed after {} steps: {}", ctx.steps(), error);
                ctx.set_state(RunState::Failed { kind: error.kind() });
                RunStatus::Failed { error }
            }
        };

        let (run_id, transcript, shared_state, steps, started_at) = ctx.into_parts();
        let outcome = RunOutcome {
            run_id,
            status,
            transcript,
            artifacts,
            shared_state,
            steps,
            started_at,
            finished_at: Utc::now(),
        };

        self.record(&outcome).await;

        let terminal = match &outcome.status {
            RunStatus::Completed { output } => RunEventKind::RunCompleted {
                output: output.clone(),
                artifacts: outcome.artifacts.clone(),
            },
            RunStatus::Failed { error } => RunEventKind::RunFailed {
                error: error.kind(),
                message: error.to_string(),
            },
        };
        events.emit(terminal);

        outcome
    }

    async fn record(&self, outcome: &RunOutcome) {
        let Some(store) = &self.audit else {
            return;
        };
        let saved = match RunRecord::from_outcome(outcome) {
            Ok(record) => store.save(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("Failed to record run {}: {}", outcome.run_id, e);
        }
    }

    /// Step until the run completes or fails. Returns the final output.
    async fn drive(
        &self,
        ctx: &mut RunContext,
        events: &mut EventEmitter,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, EngineError> {
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if ctx.steps() >= self.config.max_steps {
                return Err(EngineError::TurnBudgetExceeded {
                    max_steps: self.config.max_steps,
                });
            }
            ctx.begin_step();

            let agent = self.agent(ctx.current_agent())?;
            debug!("Step {} with agent {}", ctx.steps(), agent.id());

            let decision = self.decide(&agent, ctx.transcript()).await?;
            if cancel.is_cancelled() {
                debug!("Run {} cancelled during decision, dropping it", ctx.run_id());
                return Err(EngineError::Cancelled);
            }

            match decision {
                Decision::Text(text) => {
                    if let Some(output) = self.speak(ctx, events, &agent, text)? {
                        return Ok(output);
                    }
                }
                Decision::UseTool {
                    call_id,
                    tool,
                    arguments,
                } => {
                    self.use_tool(ctx, events, &agent, call_id, tool, arguments)
                        .await?;
                }
                Decision::Handoff { target } => {
                    self.hand_off(ctx, events, &agent, target)?;
                }
            }
        }
    }

    fn agent(&self, id: &AgentId) -> std::result::Result<Arc<AgentSpec>, EngineError> {
        self.graph
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::DecisionFailed {
                agent: id.clone(),
                message: "agent is not in the graph".to_string(),
            })
    }

    async fn decide(
        &self,
        agent: &AgentSpec,
        transcript: &Transcript,
    ) -> std::result::Result<Decision, EngineError> {
        let timeout = self.config.decision_timeout;
        match tokio::time::timeout(timeout, self.decider.decide(agent, transcript)).await {
            Ok(decision) => decision,
            Err(_) => Err(EngineError::DecisionTimeout {
                agent: agent.id().clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Record text from the agent. Returns the output when this finishes the run.
    fn speak(
        &self,
        ctx: &mut RunContext,
        events: &mut EventEmitter,
        agent: &AgentSpec,
        text: String,
    ) -> std::result::Result<Option<String>, EngineError> {
        ctx.push(Turn::AgentMessage {
            agent: agent.id().clone(),
            text: text.clone(),
        });
        events.emit(RunEventKind::TextDelta {
            agent: agent.id().clone(),
            text: text.clone(),
        });

        if !agent.is_terminal() {
            return Ok(None);
        }

        self.check_guard(ctx, agent.id())?;
        ctx.record_output(agent.id(), &text);
        Ok(Some(text))
    }

    async fn use_tool(
        &self,
        ctx: &mut RunContext,
        events: &mut EventEmitter,
        agent: &AgentSpec,
        call_id: String,
        tool: ToolId,
        arguments: String,
    ) -> std::result::Result<(), EngineError> {
        if !agent.can_use(tool) {
            return Err(EngineError::UnauthorizedTool {
                agent: agent.id().clone(),
                tool: tool.to_string(),
            });
        }

        let recorded = serde_json::from_str(&arguments)
            .unwrap_or_else(|_| serde_json::Value::String(arguments.clone()));
        ctx.push(Turn::ToolCall {
            agent: agent.id().clone(),
            call_id: call_id.clone(),
            tool,
            arguments: recorded.clone(),
        });
        events.emit(RunEventKind::ToolCalled {
            agent: agent.id().clone(),
            call_id: call_id.clone(),
            tool,
            arguments: recorded,
        });

        info!("Agent {} calling tool {}", agent.id(), tool);
        let outcome: ToolOutcome = match parse_tool_call(tool, &arguments) {
            Ok(input) => self.tools.invoke(&input).await,
            Err(e) => Err(e),
        }
        .into();

        ctx.push(Turn::ToolResult {
            call_id: call_id.clone(),
            tool,
            outcome: outcome.clone(),
        });
        events.emit(RunEventKind::ToolResult {
            call_id,
            tool,
            outcome,
        });
        Ok(())
    }

    fn hand_off(
        &self,
        ctx: &mut RunContext,
        events: &mut EventEmitter,
        agent: &AgentSpec,
        target: AgentId,
    ) -> std::result::Result<(), EngineError> {
        if !agent.can_hand_off_to(&target) {
            return Err(EngineError::UnauthorizedHandoff {
                from: agent.id().clone(),
                to: target,
            });
        }

        let next = self.agent(&target)?;
        if next.is_terminal() {
            self.check_guard(ctx, &target)?;
        }

        if let Some(text) = ctx.transcript().last_message_from(agent.id()).map(str::to_string) {
            ctx.record_output(agent.id(), &text);
        }

        info!("Handoff {} -> {}", agent.id(), target);
        ctx.push(Turn::Handoff {
            from: agent.id().clone(),
            to: target.clone(),
        });
        ctx.switch_to(target.clone());
        events.emit(RunEventKind::AgentSwitched {
            from: agent.id().clone(),
            to: target,
        });
        Ok(())
    }

    fn check_guard(&self, ctx: &RunContext, agent: &AgentId) -> std::result::Result<(), EngineError> {
        let missing = self
            .graph
            .guard()
            .missing(&ctx.transcript().succeeded_tools());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::MandatoryStepMissing {
                agent: agent.clone(),
                missing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::collect;
    use crate::tools::testing::{fake_tool_set, FakeBackends};
    use crate::tools::ToolError;
    use crate::workflow::testing::{
        cyclic_graph, handoff, linear_graph, production_graph, text, tool, ScriptedDecider,
    };
    use crate::workflow::EngineErrorKind;
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;

    struct Harness {
        engine: Arc<WorkflowEngine>,
        decider: Arc<ScriptedDecider>,
        backends: Arc<FakeBackends>,
    }

    fn harness(graph: AgentGraph, decider: ScriptedDecider) -> Harness {
        let (tools, backends) = fake_tool_set();
        let decider = Arc::new(decider);
        let engine = WorkflowEngine::new(Arc::new(graph), Arc::new(tools), decider.clone());
        Harness {
            engine: Arc::new(engine),
            decider,
            backends,
        }
    }

    async fn run(engine: &Arc<WorkflowEngine>, prompt: &str) -> (RunOutcome, Vec<RunEvent>) {
        let handle = engine.spawn(vec![prompt.to_string()]).unwrap();
        let aggregated = collect(handle.run_id, handle.events).await;
        let outcome = handle.join.await.unwrap();
        (outcome, aggregated.events)
    }

    fn handoff_targets(transcript: &Transcript) -> Vec<&str> {
        transcript
            .iter()
            .filter_map(|t| match t {
                Turn::Handoff { to, .. } => Some(to.as_str()),
                _ => None,
            })
            .collect()
    }

    fn video_call() -> Decision {
        tool(ToolId::GenerateVideo, r#"{"script": "Skates that glide.", "platform": "tiktok"}"#)
    }

    #[tokio::test]
    async fn test_linear_run_visits_every_agent_in_order() {
        let n = 5;
        let mut script: Vec<Decision> = (1..n).map(|i| handoff(&format!("agent-{}", i))).collect();
        script.push(text("final answer"));
        let h = harness(linear_graph(n), ScriptedDecider::new(script));

        let (outcome, _) = run(&h.engine, "launch the skates").await;

        assert_eq!(outcome.output(), Some("final answer"));
        let path = outcome.transcript.agent_path(&AgentId::from("agent-0"));
        let expected: Vec<AgentId> = (0..n).map(|i| AgentId::from(format!("agent-{}", i))).collect();
        assert_eq!(path, expected);

        let distinct: BTreeSet<_> = path.iter().collect();
        assert_eq!(outcome.transcript.handoff_count(), distinct.len() - 1);
        assert_eq!(
            outcome.shared_state.get("output.agent-4"),
            Some(&serde_json::Value::String("final answer".to_string()))
        );
    }

    #[tokio::test]
    async fn test_event_sequence_is_gap_free_with_one_terminal_event() {
        let h = harness(
            production_graph(),
            ScriptedDecider::new([
                text("Here is the script."),
                handoff("producer"),
                video_call(),
                handoff("summary"),
                text("Delivered."),
            ]),
        );

        let (outcome, events) = run(&h.engine, "make a video").await;

        assert!(outcome.is_completed());
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as u64);
            assert_eq!(event.run_id, outcome.run_id);
        }
        assert_eq!(events.iter().filter(|e| e.kind.is_terminal()).count(), 1);
        assert!(events.last().unwrap().kind.is_terminal());
        assert_eq!(events[0].kind.name(), "run-started");

        let names: Vec<_> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            names,
            vec![
                "run-started",
                "text-delta",
                "agent-switched",
                "tool-called",
                "tool-result",
                "agent-switched",
                "text-delta",
                "run-completed",
            ]
        );
        assert_eq!(
            outcome.artifacts.video.get("tiktok").map(String::as_str),
            Some(h.backends.stored.lock().unwrap()[0].as_str())
        );
        assert_eq!(
            outcome.shared_state.get("output.writer"),
            Some(&serde_json::Value::String("Here is the script.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_every_tool_call_is_followed_by_its_result() {
        let h = harness(
            production_graph(),
            ScriptedDecider::new([
                handoff("producer"),
                tool(ToolId::GenerateVideo, "not json"),
                video_call(),
                handoff("summary"),
                text("done"),
            ]),
        );
        *h.backends.fail_video.lock().unwrap() = Some(ToolError::unavailable("render farm down"));

        let (outcome, _) = run(&h.engine, "make a video").await;
        let turns = outcome.transcript.turns();

        for (i, turn) in turns.iter().enumerate() {
            if let Turn::ToolCall { call_id, .. } = turn {
                match turns.get(i + 1) {
                    Some(Turn::ToolResult { call_id: result_id, .. }) => assert_eq!(result_id, call_id),
                    other => panic!("tool call not followed by its result: {:?}", other),
                }
            }
        }

        // Bad arguments never reach the backend; the upstream failure is fed back.
        let failures: Vec<_> = turns
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult {
                    outcome: ToolOutcome::Failure { error },
                    ..
                } => Some(error.kind),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(h.backends.video_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.error().map(|e| e.kind()),
            Some(EngineErrorKind::MandatoryStepMissing)
        );
    }

    #[tokio::test]
    async fn test_handoff_into_terminal_agent_requires_video() {
        let h = harness(
            production_graph(),
            ScriptedDecider::new([handoff("producer"), handoff("summary"), text("never reached")]),
        );

        let (outcome, events) = run(&h.engine, "make a video").await;

        match outcome.error() {
            Some(EngineError::MandatoryStepMissing { agent, missing }) => {
                assert_eq!(agent.as_str(), "summary");
                assert_eq!(missing, &vec![ToolId::GenerateVideo]);
            }
            other => panic!("expected MandatoryStepMissing, got {:?}", other),
        }
        assert_eq!(handoff_targets(&outcome.transcript), vec!["producer"]);
        assert_eq!(h.decider.calls(), 2);
        assert_eq!(events.last().unwrap().kind.name(), "run-failed");
    }

    #[tokio::test]
    async fn test_terminal_text_is_refused_without_video() {
        let graph = AgentGraph::new("solo", vec![AgentSpec::new("solo", "Solo", "")])
            .unwrap()
            .with_guard(crate::agents::CompletionGuard::require([ToolId::GenerateVideo]));
        let h = harness(graph, ScriptedDecider::new([text("all done")]));

        let (outcome, _) = run(&h.engine, "finish early").await;

        assert_eq!(
            outcome.error().map(|e| e.kind()),
            Some(EngineErrorKind::MandatoryStepMissing)
        );
        assert!(outcome.output().is_none());
    }

    #[tokio::test]
    async fn test_cycle_stops_at_step_ceiling() {
        let script: Vec<Decision> = (0..20)
            .map(|i| handoff(if i % 2 == 0 { "pong" } else { "ping" }))
            .collect();
        let h = harness(cyclic_graph(), ScriptedDecider::new(script));
        let engine = Arc::new(
            WorkflowEngine::new(
                h.engine.graph().clone(),
                Arc::new(fake_tool_set().0),
                h.decider.clone(),
            )
            .with_config(EngineConfig::default().with_max_steps(5)),
        );

        let (outcome, _) = run(&engine, "loop").await;

        assert_eq!(
            outcome.error(),
            Some(&EngineError::TurnBudgetExceeded { max_steps: 5 })
        );
        assert_eq!(outcome.steps, 5);
        assert_eq!(h.decider.calls(), 5);
    }

    #[tokio::test]
    async fn test_undeclared_handoff_is_rejected() {
        let h = harness(
            production_graph(),
            ScriptedDecider::new([handoff("summary")]),
        );

        let (outcome, _) = run(&h.engine, "skip ahead").await;

        assert_eq!(
            outcome.error(),
            Some(&EngineError::UnauthorizedHandoff {
                from: AgentId::from("writer"),
                to: AgentId::from("summary"),
            })
        );
        assert!(handoff_targets(&outcome.transcript).is_empty());
    }

    #[tokio::test]
    async fn test_ungranted_tool_is_rejected_before_any_call() {
        let h = harness(
            production_graph(),
            ScriptedDecider::new([video_call()]),
        );

        let (outcome, _) = run(&h.engine, "render it yourself").await;

        assert_eq!(
            outcome.error().map(|e| e.kind()),
            Some(EngineErrorKind::UnauthorizedTool)
        );
        assert_eq!(h.backends.video_calls.load(Ordering::SeqCst), 0);
        assert!(!outcome
            .transcript
            .iter()
            .any(|t| matches!(t, Turn::ToolCall { .. })));
    }

    #[tokio::test]
    async fn test_non_terminal_text_keeps_the_same_agent() {
        let h = harness(
            linear_graph(2),
            ScriptedDecider::new([text("thinking"), text("still thinking"), handoff("agent-1"), text("done")]),
        );

        let (outcome, _) = run(&h.engine, "go").await;

        assert_eq!(outcome.output(), Some("done"));
        let seen = h.decider.seen.lock().unwrap().clone();
        let agents: Vec<&str> = seen.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(agents, vec!["agent-0", "agent-0", "agent-0", "agent-1"]);
        assert_eq!(
            outcome.shared_state.get("output.agent-0"),
            Some(&serde_json::Value::String("still thinking".to_string()))
        );
    }

    #[tokio::test]
    async fn test_decider_sees_the_whole_transcript() {
        let h = harness(
            linear_graph(2),
            ScriptedDecider::new([text("a"), handoff("agent-1"), text("b")]),
        );

        run(&h.engine, "go").await;

        let lengths: Vec<usize> = h.decider.seen.lock().unwrap().iter().map(|(_, n)| *n).collect();
        assert_eq!(lengths, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_takes_effect_at_next_step() {
        let decider = ScriptedDecider::new([text("one"), text("two"), text("three")])
            .with_delay(Duration::from_millis(50));
        let h = harness(cyclic_graph(), decider);

        let handle = h.engine.spawn(vec!["go".to_string()]).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel.cancel();

        let aggregated = collect(handle.run_id, handle.events).await;
        let outcome = handle.join.await.unwrap();

        assert_eq!(outcome.error(), Some(&EngineError::Cancelled));
        // The in-flight decision finished but was not applied.
        assert_eq!(h.decider.calls(), 1);
        assert_eq!(outcome.transcript.last_message_from(&AgentId::from("ping")), None);
        assert_eq!(
            aggregated.error.map(|e| e.kind),
            Some(EngineErrorKind::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_cancel_during_decision_skips_the_chosen_tool() {
        let decider = ScriptedDecider::new([handoff("producer"), video_call()])
            .with_delay(Duration::from_millis(50));
        let h = harness(production_graph(), decider);

        let handle = h.engine.spawn(vec!["make a video".to_string()]).unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        handle.cancel.cancel();

        let aggregated = collect(handle.run_id, handle.events).await;
        let outcome = handle.join.await.unwrap();

        assert_eq!(outcome.error(), Some(&EngineError::Cancelled));
        assert_eq!(h.decider.calls(), 2);
        assert_eq!(h.backends.video_calls.load(Ordering::SeqCst), 0);
        assert!(!outcome
            .transcript
            .iter()
            .any(|t| matches!(t, Turn::ToolCall { .. })));
        assert!(!aggregated
            .events
            .iter()
            .any(|e| matches!(e.kind, RunEventKind::ToolCalled { .. })));
    }

    #[tokio::test]
    async fn test_slow_decision_times_out() {
        let decider = ScriptedDecider::new([text("late")]).with_delay(Duration::from_millis(200));
        let h = harness(linear_graph(1), decider);
        let engine = Arc::new(
            WorkflowEngine::new(
                h.engine.graph().clone(),
                Arc::new(fake_tool_set().0),
                h.decider.clone(),
            )
            .with_config(EngineConfig {
                max_steps: 40,
                decision_timeout: Duration::from_millis(20),
            }),
        );

        let (outcome, _) = run(&engine, "hurry").await;

        assert_eq!(
            outcome.error().map(|e| e.kind()),
            Some(EngineErrorKind::DecisionTimeout)
        );
    }

    #[tokio::test]
    async fn test_finished_runs_are_audited() {
        let store = Arc::new(SqliteRunStore::in_memory().unwrap());
        let (tools, _) = fake_tool_set();
        let engine = Arc::new(
            WorkflowEngine::new(
                Arc::new(linear_graph(1)),
                Arc::new(tools),
                Arc::new(ScriptedDecider::new([text("shipped")])),
            )
            .with_audit(store.clone()),
        );

        let (outcome, _) = run(&engine, "ship it").await;

        let record = store.get(outcome.run_id).await.unwrap().unwrap();
        assert!(record.is_completed());
        assert_eq!(record.output, "shipped");
        let transcript: Transcript = serde_json::from_str(&record.transcript_json).unwrap();
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_start_requires_a_message() {
        let h = harness(linear_graph(1), ScriptedDecider::default());
        assert!(h.engine.start(vec!["  ".to_string()]).is_err());

        let ctx = h
            .engine
            .start(vec!["first".to_string(), "second".to_string()])
            .unwrap();
        assert_eq!(ctx.transcript().len(), 2);
        assert_eq!(ctx.current_agent().as_str(), "agent-0");
        assert_eq!(ctx.state(), &RunState::Idle);
    }
}
