//! Tool adapters for the marketing agents.
//!
//! Every tool is a closed [`ToolId`] with a typed input, a JSON schema exposed to
//! the model, and a handler selected by exhaustive matching in [`ToolSet::invoke`].
//! Inputs are validated before any network call, each invocation performs a
//! single outbound operation (plus an artifact upload for media), and tools
//! never retry: retry policy belongs to the agent that called them.

mod audio;
mod open_link;
mod storage;
mod video;

pub use audio::OpenAISpeechSynthesizer;
pub use open_link::{extract_page, HttpPageFetcher};
pub use storage::LocalArtifactStore;
pub use video::HttpVideoSynthesizer;

use crate::config::Settings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Identifier of a tool an agent may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    /// Fetch a web page and extract its content.
    OpenLink,
    /// Text-to-speech synthesis.
    GenerateAudio,
    /// Video synthesis from a script and optional voiceover.
    GenerateVideo,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::OpenLink, ToolId::GenerateAudio, ToolId::GenerateVideo];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::OpenLink => "open_link",
            ToolId::GenerateAudio => "generate_audio",
            ToolId::GenerateVideo => "generate_video",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open_link" => Ok(ToolId::OpenLink),
            "generate_audio" => Ok(ToolId::GenerateAudio),
            "generate_video" => Ok(ToolId::GenerateVideo),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

/// Category of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidInput,
    UpstreamUnavailable,
    UpstreamRejected,
    Timeout,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolErrorKind::InvalidInput => "invalid_input",
            ToolErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ToolErrorKind::UpstreamRejected => "upstream_rejected",
            ToolErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A recoverable tool failure. It is recorded in the transcript and shown to
/// the agent, which may retry or pick another action.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::UpstreamUnavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::UpstreamRejected, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }

    /// Classify a transport error from an HTTP upstream.
    pub(crate) fn from_reqwest(service: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("{} timed out: {}", service, e))
        } else if let Some(status) = e.status() {
            Self::from_status(service, status, &e.to_string())
        } else {
            Self::unavailable(format!("{} unreachable: {}", service, e))
        }
    }

    /// Classify a non-success HTTP status from an upstream.
    pub(crate) fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        if status.is_client_error() {
            Self::rejected(format!("{} rejected the request ({}): {}", service, status, snippet))
        } else {
            Self::unavailable(format!("{} failed ({}): {}", service, status, snippet))
        }
    }
}

/// Target platform for a script, voiceover or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
    Linkedin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Linkedin => "linkedin",
        }
    }

    /// Frame shape expected by the platform's feed.
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            Platform::Tiktok | Platform::Instagram => "9:16",
            Platform::Youtube => "16:9",
            Platform::Linkedin => "1:1",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voices offered by the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            _ => Err(format!("Unknown voice: {}", s)),
        }
    }
}

/// Speech models offered by the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechModel {
    #[serde(rename = "tts-1")]
    Tts1,
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
}

impl FromStr for SpeechModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tts-1" => Ok(SpeechModel::Tts1),
            "tts-1-hd" => Ok(SpeechModel::Tts1Hd),
            _ => Err(format!("Unknown speech model: {}", s)),
        }
    }
}

/// Arguments of `open_link`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLinkInput {
    pub url: String,
}

/// Arguments of `generate_audio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateAudioInput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<SpeechModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Arguments of `generate_video`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateVideoInput {
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// A validated tool request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInput {
    OpenLink(OpenLinkInput),
    GenerateAudio(GenerateAudioInput),
    GenerateVideo(GenerateVideoInput),
}

/// Allowed range for the speech speed multiplier.
pub const SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.25..=4.0;

impl ToolInput {
    pub fn tool_id(&self) -> ToolId {
        match self {
            ToolInput::OpenLink(_) => ToolId::OpenLink,
            ToolInput::GenerateAudio(_) => ToolId::GenerateAudio,
            ToolInput::GenerateVideo(_) => ToolId::GenerateVideo,
        }
    }

    /// Check the input against its schema constraints.
    pub fn validate(&self) -> std::result::Result<(), ToolError> {
        match self {
            ToolInput::OpenLink(input) => {
                parse_http_url(&input.url)?;
            }
            ToolInput::GenerateAudio(input) => {
                if input.text.trim().is_empty() {
                    return Err(ToolError::invalid_input("'text' must not be empty"));
                }
                if let Some(speed) = input.speed {
                    if !SPEED_RANGE.contains(&speed) {
                        return Err(ToolError::invalid_input(format!(
                            "'speed' must be between {} and {}, got {}",
                            SPEED_RANGE.start(),
                            SPEED_RANGE.end(),
                            speed
                        )));
                    }
                }
            }
            ToolInput::GenerateVideo(input) => {
                if input.script.trim().is_empty() {
                    return Err(ToolError::invalid_input("'script' must not be empty"));
                }
                if let Some(audio_url) = &input.audio_url {
                    parse_http_url(audio_url).or_else(|e| {
                        // Locally stored voiceovers are referenced by file URL.
                        match Url::parse(audio_url) {
                            Ok(u) if u.scheme() == "file" => Ok(u),
                            _ => Err(e),
                        }
                    })?;
                }
            }
        }
        Ok(())
    }
}

fn parse_http_url(raw: &str) -> std::result::Result<Url, ToolError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ToolError::invalid_input(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::invalid_input(format!(
            "Unsupported URL scheme '{}' in '{}'",
            other, raw
        ))),
    }
}

/// Metadata extracted from an opened page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    Page {
        content: String,
        metadata: PageMetadata,
    },
    Audio {
        audio_url: String,
        duration_seconds: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<Platform>,
    },
    Video {
        video_url: String,
        duration_seconds: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<Platform>,
    },
}

/// Fetches and extracts a web page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<ToolOutput, ToolError>;
}

/// A fully resolved speech request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    pub model: SpeechModel,
    pub speed: f32,
}

/// Text-to-speech backend. Returns encoded MP3 audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, ToolError>;
}

/// A rendered video as returned by the synthesis service.
#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub bytes: Vec<u8>,
    pub duration_seconds: Option<f64>,
}

/// Video synthesis backend.
#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    async fn render(&self, input: &GenerateVideoInput) -> std::result::Result<RenderedVideo, ToolError>;
}

/// Durable storage for generated media.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the bytes under `key` and return a durable URL.
    async fn put(&self, key: &str, bytes: &[u8]) -> std::result::Result<String, ToolError>;
}

/// Words per minute of narration at speed 1.0.
const NARRATION_WPM: f64 = 150.0;

/// Estimate narration length for a text read at the given speed.
pub fn estimate_narration_seconds(text: &str, speed: f32) -> f64 {
    let words = text.split_whitespace().count() as f64;
    let speed = if speed > 0.0 { speed as f64 } else { 1.0 };
    (words / (NARRATION_WPM * speed) * 60.0 * 10.0).round() / 10.0
}

/// The set of tool backends shared by every run.
pub struct ToolSet {
    fetcher: Arc<dyn PageFetcher>,
    speech: Arc<dyn SpeechSynthesizer>,
    video: Arc<dyn VideoSynthesizer>,
    store: Arc<dyn ArtifactStore>,
    default_voice: Voice,
    default_model: SpeechModel,
    timeout: Duration,
}

impl ToolSet {
    /// Create a tool set from explicit backends.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        speech: Arc<dyn SpeechSynthesizer>,
        video: Arc<dyn VideoSynthesizer>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            fetcher,
            speech,
            video,
            store,
            default_voice: Voice::Nova,
            default_model: SpeechModel::Tts1,
            timeout: Duration::from_secs(600),
        }
    }

    /// Create the production tool set from settings.
    pub fn from_settings(settings: &Settings) -> crate::error::Result<Self> {
        let tools = &settings.tools;
        let fetcher = Arc::new(HttpPageFetcher::new(&tools.user_agent, tools.max_page_bytes)?);
        let speech = Arc::new(OpenAISpeechSynthesizer::new()?);
        let api_key = std::env::var(&tools.video_api_key_env).ok().filter(|k| !k.is_empty());
        let video = Arc::new(HttpVideoSynthesizer::new(tools.video_endpoint.clone(), api_key)?);
        let store = Arc::new(LocalArtifactStore::new(
            settings.artifact_dir(),
            tools.public_base_url.clone(),
        ));

        let default_voice: Voice = tools.default_voice.parse().map_err(|e: String| {
            crate::error::ShipShowError::Config(e)
        })?;
        let default_model: SpeechModel = tools.tts_model.parse().map_err(|e: String| {
            crate::error::ShipShowError::Config(e)
        })?;

        Ok(Self::new(fetcher, speech, video, store)
            .with_audio_defaults(default_voice, default_model)
            .with_timeout(settings.workflow.tool_timeout()))
    }

    /// Set the bounded wait applied to every invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the voice and model used when the agent leaves them out.
    pub fn with_audio_defaults(mut self, voice: Voice, model: SpeechModel) -> Self {
        self.default_voice = voice;
        self.default_model = model;
        self
    }

    /// Validate and execute a tool request.
    ///
    /// Validation failures return before any network side effect.
    #[instrument(skip(self, input), fields(tool = %input.tool_id()))]
    pub async fn invoke(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolError> {
        input.validate()?;

        match tokio::time::timeout(self.timeout, self.dispatch(input)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!("Tool {} failed: {}", input.tool_id(), e);
                }
                result
            }
            Err(_) => {
                warn!("Tool {} timed out after {:?}", input.tool_id(), self.timeout);
                Err(ToolError::timeout(format!(
                    "{} did not finish within {}s",
                    input.tool_id(),
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn dispatch(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolError> {
        match input {
            ToolInput::OpenLink(args) => {
                let url = parse_http_url(&args.url)?;
                info!("Opening link {}", url);
                self.fetcher.fetch(&url).await
            }
            ToolInput::GenerateAudio(args) => {
                let request = SpeechRequest {
                    text: args.text.clone(),
                    voice: args.voice.unwrap_or(self.default_voice),
                    model: args.model.unwrap_or(self.default_model),
                    speed: args.speed.unwrap_or(1.0),
                };
                let bytes = self.speech.synthesize(&request).await?;
                let key = format!("audio/{}.mp3", Uuid::new_v4());
                let audio_url = self.store.put(&key, &bytes).await?;
                info!("Stored voiceover at {}", audio_url);

                Ok(ToolOutput::Audio {
                    audio_url,
                    duration_seconds: estimate_narration_seconds(&request.text, request.speed),
                    platform: args.platform,
                })
            }
            ToolInput::GenerateVideo(args) => {
                let rendered = self.video.render(args).await?;
                let key = format!("video/{}.mp4", Uuid::new_v4());
                let video_url = self.store.put(&key, &rendered.bytes).await?;
                info!("Stored video at {}", video_url);

                Ok(ToolOutput::Video {
                    video_url,
                    duration_seconds: rendered
                        .duration_seconds
                        .unwrap_or_else(|| estimate_narration_seconds(&args.script, 1.0)),
                    platform: args.platform,
                })
            }
        }
    }
}

/// Parse a tool call from the model's function-call format.
///
/// Empty argument strings are treated as `{}`. Any schema mismatch is an
/// `InvalidInput` tool error, never a network call.
pub fn parse_tool_call(tool: ToolId, arguments: &str) -> std::result::Result<ToolInput, ToolError> {
    let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
    let args: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| ToolError::invalid_input(format!("Invalid tool arguments: {}", e)))?;

    let invalid = |e: serde_json::Error| ToolError::invalid_input(format!("{}: {}", tool, e));
    let input = match tool {
        ToolId::OpenLink => ToolInput::OpenLink(serde_json::from_value(args).map_err(invalid)?),
        ToolId::GenerateAudio => {
            ToolInput::GenerateAudio(serde_json::from_value(args).map_err(invalid)?)
        }
        ToolId::GenerateVideo => {
            ToolInput::GenerateVideo(serde_json::from_value(args).map_err(invalid)?)
        }
    };

    input.validate()?;
    Ok(input)
}

/// Get OpenAI function definitions for the given tools.
pub fn tool_definitions(tools: &BTreeSet<ToolId>) -> Vec<async_openai::types::ChatCompletionTool> {
    tools.iter().map(|tool| function_tool(*tool)).collect()
}

pub(crate) fn function_definition(
    name: &str,
    description: &str,
    parameters: serde_json::Value,
) -> async_openai::types::ChatCompletionTool {
    use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};

    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: Some(parameters),
            strict: None,
        },
    }
}

fn function_tool(tool: ToolId) -> async_openai::types::ChatCompletionTool {
    match tool {
        ToolId::OpenLink => function_definition(
            "open_link",
            "Open a URL and extract the page title, description and text content. \
            Use this to research a product page.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to open"
                    }
                },
                "required": ["url"]
            }),
        ),
        ToolId::GenerateAudio => function_definition(
            "generate_audio",
            "Generate a voiceover audio file from text (text to speech). \
            Returns the audio URL and its estimated duration.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "The text to read aloud"
                    },
                    "voice": {
                        "type": "string",
                        "enum": ["alloy", "echo", "fable", "onyx", "nova", "shimmer"],
                        "description": "Voice to use (default: nova)"
                    },
                    "model": {
                        "type": "string",
                        "enum": ["tts-1", "tts-1-hd"],
                        "description": "Speech model (default: tts-1)"
                    },
                    "speed": {
                        "type": "number",
                        "minimum": 0.25,
                        "maximum": 4.0,
                        "description": "Speed multiplier (default: 1.0)"
                    },
                    "platform": {
                        "type": "string",
                        "enum": ["tiktok", "instagram", "youtube", "linkedin"],
                        "description": "Platform this voiceover is for"
                    }
                },
                "required": ["text"]
            }),
        ),
        ToolId::GenerateVideo => function_definition(
            "generate_video",
            "Generate a video from a full script and an optional voiceover audio URL. \
            Returns the video URL and its duration.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "script": {
                        "type": "string",
                        "description": "The full video script"
                    },
                    "audio_url": {
                        "type": "string",
                        "description": "URL of the voiceover to lay under the video"
                    },
                    "platform": {
                        "type": "string",
                        "enum": ["tiktok", "instagram", "youtube", "linkedin"],
                        "description": "Platform the video is formatted for"
                    }
                },
                "required": ["script"]
            }),
        ),
    }
}
