//! `generate_audio` backend using OpenAI text-to-speech.

use super::{SpeechModel, SpeechRequest, SpeechSynthesizer, ToolError, Voice};
use crate::error::Result;
use crate::openai::create_client;
use async_openai::error::OpenAIError;
use async_openai::types::{self as oai, CreateSpeechRequestArgs, SpeechResponseFormat};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Speech synthesizer backed by the OpenAI audio API.
pub struct OpenAISpeechSynthesizer {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAISpeechSynthesizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client()?,
        })
    }
}

impl From<Voice> for oai::Voice {
    fn from(voice: Voice) -> Self {
        match voice {
            Voice::Alloy => oai::Voice::Alloy,
            Voice::Echo => oai::Voice::Echo,
            Voice::Fable => oai::Voice::Fable,
            Voice::Onyx => oai::Voice::Onyx,
            Voice::Nova => oai::Voice::Nova,
            Voice::Shimmer => oai::Voice::Shimmer,
        }
    }
}

impl From<SpeechModel> for oai::SpeechModel {
    fn from(model: SpeechModel) -> Self {
        match model {
            SpeechModel::Tts1 => oai::SpeechModel::Tts1,
            SpeechModel::Tts1Hd => oai::SpeechModel::Tts1Hd,
        }
    }
}

/// Map an OpenAI client error onto the tool failure taxonomy.
pub(crate) fn classify_openai_error(e: OpenAIError) -> ToolError {
    match e {
        OpenAIError::Reqwest(e) => ToolError::from_reqwest("Speech service", e),
        OpenAIError::ApiError(e) => {
            let message = format!("Speech service: {}", e.message);
            let transient = [e.r#type.as_deref(), e.code.as_deref()].into_iter().flatten().any(|t| {
                matches!(
                    t,
                    "rate_limit_exceeded" | "server_error" | "service_unavailable"
                )
            });
            if transient {
                ToolError::unavailable(message)
            } else {
                ToolError::rejected(message)
            }
        }
        OpenAIError::InvalidArgument(msg) => ToolError::invalid_input(msg),
        other => ToolError::unavailable(format!("Speech service: {}", other)),
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeechSynthesizer {
    #[instrument(skip(self, request), fields(chars = request.text.len()))]
    async fn synthesize(&self, request: &SpeechRequest) -> std::result::Result<Vec<u8>, ToolError> {
        let speech = CreateSpeechRequestArgs::default()
            .input(request.text.clone())
            .voice(oai::Voice::from(request.voice))
            .model(oai::SpeechModel::from(request.model))
            .speed(request.speed)
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(classify_openai_error)?;

        let response = self
            .client
            .audio()
            .speech(speech)
            .await
            .map_err(classify_openai_error)?;

        debug!("Synthesized {} bytes of audio", response.bytes.len());
        Ok(response.bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_maps_to_invalid_input() {
        let err = classify_openai_error(OpenAIError::InvalidArgument("speed".to_string()));
        assert_eq!(err.kind, crate::tools::ToolErrorKind::InvalidInput);
    }

    fn api_error(r#type: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(async_openai::error::ApiError {
            message: "nope".to_string(),
            r#type: r#type.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_api_errors_split_by_type() {
        use crate::tools::ToolErrorKind;

        let rate_limited = classify_openai_error(api_error(Some("requests"), Some("rate_limit_exceeded")));
        assert_eq!(rate_limited.kind, ToolErrorKind::UpstreamUnavailable);

        let overloaded = classify_openai_error(api_error(Some("server_error"), None));
        assert_eq!(overloaded.kind, ToolErrorKind::UpstreamUnavailable);

        let refused = classify_openai_error(api_error(Some("invalid_request_error"), Some("invalid_value")));
        assert_eq!(refused.kind, ToolErrorKind::UpstreamRejected);
    }
}
