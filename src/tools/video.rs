//! `generate_video` backend that calls an HTTP video synthesis service.
//!
//! The service receives the script, the voiceover URL and the frame shape as
//! JSON and answers with the rendered MP4. When it reports the clip length in
//! an `x-duration-seconds` header, that value is used as-is.

use super::{GenerateVideoInput, RenderedVideo, ToolError, VideoSynthesizer};
use crate::error::{Result, ShipShowError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

const DURATION_HEADER: &str = "x-duration-seconds";

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    script: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'a str>,
    aspect_ratio: &'a str,
}

/// Video synthesizer backed by a configurable HTTP endpoint.
pub struct HttpVideoSynthesizer {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl HttpVideoSynthesizer {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(900))
            .build()
            .map_err(|e| ShipShowError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl VideoSynthesizer for HttpVideoSynthesizer {
    #[instrument(skip(self, input), fields(platform = ?input.platform))]
    async fn render(&self, input: &GenerateVideoInput) -> std::result::Result<RenderedVideo, ToolError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ToolError::unavailable("No video synthesis endpoint is configured"))?;

        let body = RenderRequest {
            script: &input.script,
            audio_url: input.audio_url.as_deref(),
            platform: input.platform.as_ref().map(|p| p.as_str()),
            aspect_ratio: input.platform.map(|p| p.aspect_ratio()).unwrap_or("16:9"),
        };

        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("Video service", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::from_status("Video service", status, &text));
        }

        let duration_seconds = response
            .headers()
            .get(DURATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolError::from_reqwest("Video service", e))?;

        if bytes.is_empty() {
            return Err(ToolError::unavailable("Video service returned an empty body"));
        }

        debug!("Rendered {} bytes of video", bytes.len());
        Ok(RenderedVideo {
            bytes: bytes.to_vec(),
            duration_seconds,
        })
    }
}
