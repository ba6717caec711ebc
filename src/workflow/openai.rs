//! Decisions made by an OpenAI chat model with function calling.

use super::decision::{Decider, Decision};
use super::transcript::{Transcript, Turn};
use super::EngineError;
use crate::agents::{AgentGraph, AgentId, AgentSpec};
use crate::config::Settings;
use crate::error::Result;
use crate::openai::create_client_with_timeout;
use crate::tools::{function_definition, tool_definitions, ToolId};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequestArgs,
    FunctionCall,
};
use async_openai::Client;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Prefix of the synthetic functions that transfer control to another agent.
const HANDOFF_PREFIX: &str = "transfer_to_";

/// Asks a chat model what the active agent does next.
pub struct OpenAIDecider {
    client: Client<OpenAIConfig>,
    model: String,
    graph: Arc<AgentGraph>,
    context_window: Option<usize>,
}

impl OpenAIDecider {
    pub fn from_settings(graph: Arc<AgentGraph>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(Duration::from_secs(settings.openai.request_timeout_secs))?,
            model: settings.openai.model.clone(),
            graph,
            context_window: settings.workflow.context_window,
        })
    }

    fn system_prompt(&self, agent: &AgentSpec) -> String {
        let mut prompt = format!("You are the {}.\n\n{}", agent.name(), agent.instructions());

        if !agent.is_terminal() {
            prompt.push_str("\n\nWhen your part is done, hand off by calling one of:");
            for target in agent.allowed_handoffs() {
                let name = self
                    .graph
                    .get(target)
                    .map(|spec| spec.name().to_string())
                    .unwrap_or_else(|| target.to_string());
                prompt.push_str(&format!("\n- {}{} ({})", HANDOFF_PREFIX, target, name));
            }
        }

        prompt
    }

    fn functions(&self, agent: &AgentSpec) -> Vec<ChatCompletionTool> {
        let mut functions = tool_definitions(agent.allowed_tools());
        functions.extend(agent.allowed_handoffs().iter().map(|target| {
            let description = match self.graph.get(target) {
                Some(spec) => format!("Hand off the conversation to the {}.", spec.name()),
                None => format!("Hand off the conversation to {}.", target),
            };
            function_definition(
                &format!("{}{}", HANDOFF_PREFIX, target),
                &description,
                serde_json::json!({ "type": "object", "properties": {} }),
            )
        }));
        functions
    }
}

/// The turns sent to the model: all leading user messages plus the last
/// `window` turns, never starting on a tool result whose call was cut off.
fn visible_turns(turns: &[Turn], window: Option<usize>) -> Vec<&Turn> {
    let Some(window) = window else {
        return turns.iter().collect();
    };

    let leading = turns
        .iter()
        .take_while(|t| matches!(t, Turn::UserMessage { .. }))
        .count();
    let mut start = turns.len().saturating_sub(window).max(leading);
    while start < turns.len() && matches!(turns[start], Turn::ToolResult { .. }) {
        start += 1;
    }

    turns[..leading].iter().chain(turns[start..].iter()).collect()
}

fn build_error(agent: &AgentSpec, e: impl std::fmt::Display) -> EngineError {
    EngineError::DecisionFailed {
        agent: agent.id().clone(),
        message: e.to_string(),
    }
}

fn to_messages(
    agent: &AgentSpec,
    system: String,
    turns: &[&Turn],
) -> std::result::Result<Vec<ChatCompletionRequestMessage>, EngineError> {
    let err = |e: async_openai::error::OpenAIError| build_error(agent, e);
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(err)?
            .into(),
    ];

    for turn in turns {
        let message: ChatCompletionRequestMessage = match turn {
            Turn::UserMessage { text } => ChatCompletionRequestUserMessageArgs::default()
                .content(text.clone())
                .build()
                .map_err(err)?
                .into(),
            Turn::AgentMessage { agent: speaker, text } => {
                let content = if speaker == agent.id() {
                    text.clone()
                } else {
                    format!("[{}] {}", speaker, text)
                };
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(err)?
                    .into()
            }
            Turn::ToolCall {
                call_id,
                tool,
                arguments,
                ..
            } => ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(vec![ChatCompletionMessageToolCall {
                    id: call_id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: tool.to_string(),
                        arguments: match arguments {
                            serde_json::Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                }])
                .build()
                .map_err(err)?
                .into(),
            Turn::ToolResult { call_id, outcome, .. } => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(call_id.clone())
                .content(outcome.render())
                .build()
                .map_err(err)?
                .into(),
            Turn::Handoff { from, to } => ChatCompletionRequestSystemMessageArgs::default()
                .content(format!("{} handed the conversation off to {}.", from, to))
                .build()
                .map_err(err)?
                .into(),
        };
        messages.push(message);
    }

    Ok(messages)
}

/// Turn a function call from the model into a decision.
fn parse_function_call(
    agent: &AgentSpec,
    call: &ChatCompletionMessageToolCall,
) -> std::result::Result<Decision, EngineError> {
    let name = call.function.name.as_str();

    if let Some(target) = name.strip_prefix(HANDOFF_PREFIX) {
        return Ok(Decision::Handoff {
            target: AgentId::from(target),
        });
    }

    match name.parse::<ToolId>() {
        Ok(tool) => Ok(Decision::UseTool {
            call_id: call.id.clone(),
            tool,
            arguments: call.function.arguments.clone(),
        }),
        Err(_) => Err(EngineError::UnauthorizedTool {
            agent: agent.id().clone(),
            tool: name.to_string(),
        }),
    }
}

/// Prose from a non-terminal agent does not move the run forward, so after
/// speaking once it must call a tool or hand off.
fn must_act(agent: &AgentSpec, transcript: &Transcript) -> bool {
    !agent.is_terminal()
        && matches!(
            transcript.last(),
            Some(Turn::AgentMessage { agent: speaker, .. }) if speaker == agent.id()
        )
}

#[async_trait]
impl Decider for OpenAIDecider {
    #[instrument(skip_all, fields(agent = %agent.id()))]
    async fn decide(&self, agent: &AgentSpec, transcript: &Transcript) -> std::result::Result<Decision, EngineError> {
        let turns = visible_turns(transcript.turns(), self.context_window);
        let messages = to_messages(agent, self.system_prompt(agent), &turns)?;
        let functions = self.functions(agent);

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);
        if !functions.is_empty() {
            let choice = if must_act(agent, transcript) {
                ChatCompletionToolChoiceOption::Required
            } else {
                ChatCompletionToolChoiceOption::Auto
            };
            request
                .tools(functions)
                .tool_choice(choice)
                .parallel_tool_calls(false);
        }
        let request = request.build().map_err(|e| build_error(agent, e))?;

        debug!("Requesting decision with {} turns", turns.len());
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| build_error(agent, format!("OpenAI API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| build_error(agent, "No response from model"))?;

        if let Some(call) = choice.message.tool_calls.as_ref().and_then(|calls| calls.first()) {
            return parse_function_call(agent, call);
        }

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(Decision::Text(text)),
            _ => Err(build_error(agent, "Model returned neither text nor a function call")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolError, ToolOutput};
    use crate::workflow::ToolOutcome;

    fn call(name: &str, arguments: &str) -> ChatCompletionMessageToolCall {
        ChatCompletionMessageToolCall {
            id: "call_abc".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn producer() -> AgentSpec {
        AgentSpec::new("video_producer", "Video Producer", "Render.")
            .with_tool(ToolId::GenerateVideo)
            .with_handoff("summary")
    }

    #[test]
    fn test_parse_handoff_and_tool_calls() {
        let agent = producer();

        assert_eq!(
            parse_function_call(&agent, &call("transfer_to_summary", "{}")).unwrap(),
            Decision::Handoff {
                target: AgentId::from("summary")
            }
        );
        assert_eq!(
            parse_function_call(&agent, &call("generate_video", r#"{"script":"x"}"#)).unwrap(),
            Decision::UseTool {
                call_id: "call_abc".to_string(),
                tool: ToolId::GenerateVideo,
                arguments: r#"{"script":"x"}"#.to_string(),
            }
        );

        let err = parse_function_call(&agent, &call("delete_everything", "{}")).unwrap_err();
        assert_eq!(err.kind(), crate::workflow::EngineErrorKind::UnauthorizedTool);
    }

    #[test]
    fn test_context_window_keeps_prompt_and_call_pairs() {
        let agent = AgentId::from("video_producer");
        let turns = vec![
            Turn::UserMessage {
                text: "Launch the skates".to_string(),
            },
            Turn::AgentMessage {
                agent: agent.clone(),
                text: "Working on it".to_string(),
            },
            Turn::ToolCall {
                agent: agent.clone(),
                call_id: "c1".to_string(),
                tool: ToolId::GenerateVideo,
                arguments: serde_json::json!({"script": "x"}),
            },
            Turn::ToolResult {
                call_id: "c1".to_string(),
                tool: ToolId::GenerateVideo,
                outcome: ToolOutcome::Failure {
                    error: ToolError::timeout("slow"),
                },
            },
            Turn::AgentMessage {
                agent: agent.clone(),
                text: "Retrying".to_string(),
            },
        ];

        assert_eq!(visible_turns(&turns, None).len(), 5);

        let window = visible_turns(&turns, Some(2));
        assert_eq!(window.len(), 2);
        assert!(matches!(window[0], Turn::UserMessage { .. }));
        assert!(matches!(window[1], Turn::AgentMessage { .. }));

        let window = visible_turns(&turns, Some(3));
        assert_eq!(window.len(), 4);
        assert!(matches!(window[1], Turn::ToolCall { .. }));
    }

    #[test]
    fn test_non_terminal_agent_must_act_after_speaking() {
        let agent = producer();
        let mut transcript = Transcript::new();
        transcript.push(Turn::UserMessage {
            text: "go".to_string(),
        });
        assert!(!must_act(&agent, &transcript));

        transcript.push(Turn::AgentMessage {
            agent: agent.id().clone(),
            text: "Here is my plan".to_string(),
        });
        assert!(must_act(&agent, &transcript));

        let terminal = AgentSpec::new("summary", "Delivery Lead", "");
        assert!(!must_act(&terminal, &transcript));
    }

    #[test]
    fn test_transcript_maps_to_chat_messages() {
        let agent = producer();
        let turns = vec![
            Turn::UserMessage {
                text: "go".to_string(),
            },
            Turn::Handoff {
                from: AgentId::from("copywriter"),
                to: agent.id().clone(),
            },
            Turn::ToolCall {
                agent: agent.id().clone(),
                call_id: "c1".to_string(),
                tool: ToolId::GenerateVideo,
                arguments: serde_json::json!({"script": "x"}),
            },
            Turn::ToolResult {
                call_id: "c1".to_string(),
                tool: ToolId::GenerateVideo,
                outcome: ToolOutcome::Success {
                    output: ToolOutput::Video {
                        video_url: "https://cdn/v.mp4".to_string(),
                        duration_seconds: 12.0,
                        platform: None,
                    },
                },
            },
        ];
        let refs: Vec<&Turn> = turns.iter().collect();

        let messages = to_messages(&agent, "system".to_string(), &refs).unwrap();
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[4], ChatCompletionRequestMessage::Tool(_)));
    }
}
