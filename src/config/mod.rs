//! Configuration module for ShipShow.
//!
//! Handles loading and managing application settings and agent prompt templates.

mod prompts;
mod settings;

pub use prompts::{AgentPrompts, Prompts};
pub use settings::{
    AuditSettings, GeneralSettings, OpenAISettings, PromptSettings, ServerSettings, Settings,
    ToolSettings, WorkflowSettings,
};
