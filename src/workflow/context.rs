//! Per-run state owned by the engine while the run is active.

use super::transcript::{ToolOutcome, Transcript, Turn};
use super::EngineErrorKind;
use crate::agents::AgentId;
use crate::tools::{GenerateAudioInput, GenerateVideoInput, Platform, ToolId, ToolOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running { agent: AgentId },
    Completed,
    Failed { kind: EngineErrorKind },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }
}

/// Mutable state of one run. Owned by exactly one execution path.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    current_agent: AgentId,
    transcript: Transcript,
    shared_state: BTreeMap<String, serde_json::Value>,
    state: RunState,
    steps: usize,
    started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(start: AgentId) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            current_agent: start,
            transcript: Transcript::new(),
            shared_state: BTreeMap::new(),
            state: RunState::Idle,
            steps: 0,
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn current_agent(&self) -> &AgentId {
        &self.current_agent
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub(crate) fn begin_step(&mut self) {
        self.steps += 1;
    }

    /// Transfer control. The caller has validated the edge.
    pub(crate) fn switch_to(&mut self, agent: AgentId) {
        self.state = RunState::Running {
            agent: agent.clone(),
        };
        self.current_agent = agent;
    }

    /// Record the stage output of an agent under `output.<agent>`.
    pub(crate) fn record_output(&mut self, agent: &AgentId, text: &str) {
        self.shared_state.insert(
            format!("output.{}", agent),
            serde_json::Value::String(text.to_string()),
        );
    }

    pub(crate) fn into_parts(self) -> (Uuid, Transcript, BTreeMap<String, serde_json::Value>, usize, DateTime<Utc>) {
        (self.run_id, self.transcript, self.shared_state, self.steps, self.started_at)
    }
}

/// Deliverables keyed by platform, or by `clip-<n>` when no platform was named.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    /// Final text of the agent that researched the product pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_summary: Option<String>,
    pub scripts: BTreeMap<String, String>,
    pub audio: BTreeMap<String, String>,
    pub video: BTreeMap<String, String>,
}

impl Artifacts {
    /// Collect the scripts written and the media produced during a run.
    ///
    /// Scripts are taken from every render request, so a platform whose render
    /// failed still has its copy. Media comes from successful calls only.
    pub fn from_transcript(transcript: &Transcript) -> Self {
        let mut artifacts = Artifacts::default();
        let mut keys: HashMap<&str, String> = HashMap::new();
        let mut audio_clips = 0;
        let mut video_clips = 0;
        let mut researcher: Option<&AgentId> = None;

        for turn in transcript {
            match turn {
                Turn::ToolCall {
                    call_id,
                    tool: ToolId::GenerateAudio,
                    arguments,
                    ..
                } => {
                    audio_clips += 1;
                    let input = serde_json::from_value::<GenerateAudioInput>(arguments.clone()).ok();
                    let key = clip_key(input.as_ref().and_then(|i| i.platform), audio_clips);
                    if let Some(input) = input {
                        artifacts.scripts.entry(key.clone()).or_insert(input.text);
                    }
                    keys.insert(call_id.as_str(), key);
                }
                Turn::ToolCall {
                    call_id,
                    tool: ToolId::GenerateVideo,
                    arguments,
                    ..
                } => {
                    video_clips += 1;
                    let input = serde_json::from_value::<GenerateVideoInput>(arguments.clone()).ok();
                    let key = clip_key(input.as_ref().and_then(|i| i.platform), video_clips);
                    if let Some(input) = input {
                        artifacts.scripts.insert(key.clone(), input.script);
                    }
                    keys.insert(call_id.as_str(), key);
                }
                Turn::ToolCall {
                    agent,
                    tool: ToolId::OpenLink,
                    ..
                } => {
                    researcher = Some(agent);
                }
                Turn::ToolResult {
                    call_id,
                    outcome: ToolOutcome::Success { output },
                    ..
                } => {
                    let Some(key) = keys.get(call_id.as_str()) else {
                        continue;
                    };
                    match output {
                        ToolOutput::Audio { audio_url, .. } => {
                            artifacts.audio.insert(key.clone(), audio_url.clone());
                        }
                        ToolOutput::Video { video_url, .. } => {
                            artifacts.video.insert(key.clone(), video_url.clone());
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        artifacts.research_summary = researcher
            .and_then(|agent| transcript.last_message_from(agent))
            .map(str::to_string);
        artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.audio.is_empty() && self.video.is_empty()
    }
}

fn clip_key(platform: Option<Platform>, n: usize) -> String {
    platform
        .map(|p| p.to_string())
        .unwrap_or_else(|| format!("clip-{}", n))
}
