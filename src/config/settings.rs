//! Configuration settings for ShipShow.

use crate::tools::ToolId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub openai: OpenAISettings,
    pub workflow: WorkflowSettings,
    pub tools: ToolSettings,
    pub audit: AuditSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (artifacts, audit log).
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.shipshow".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Settings for the reasoning model behind every agent decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// Chat model used for agent decisions.
    pub model: String,
    /// Transport timeout for OpenAI requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Agent that receives the user's request.
    pub start_agent: String,
    /// Maximum number of decision steps per run.
    pub max_steps: usize,
    /// Bounded wait for a single decision, in seconds.
    pub decision_timeout_secs: u64,
    /// Bounded wait for a single tool invocation, in seconds.
    pub tool_timeout_secs: u64,
    /// Number of most recent turns sent to the model. None sends the whole transcript.
    pub context_window: Option<usize>,
    /// Tools that must have succeeded at least once before a terminal agent may finish.
    pub required_tools: Vec<ToolId>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            start_agent: "coordinator".to_string(),
            max_steps: 40,
            decision_timeout_secs: 120,
            tool_timeout_secs: 600,
            context_window: None,
            required_tools: vec![ToolId::GenerateVideo],
        }
    }
}

impl WorkflowSettings {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Tool adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// User agent sent when opening links.
    pub user_agent: String,
    /// Maximum number of bytes of extracted page text returned to the agent.
    pub max_page_bytes: usize,
    /// Voice used when the agent does not pick one.
    pub default_voice: String,
    /// Speech model used when the agent does not pick one.
    pub tts_model: String,
    /// Video synthesis endpoint. Video generation fails as unavailable when unset.
    pub video_endpoint: Option<String>,
    /// Environment variable holding the video service API key.
    pub video_api_key_env: String,
    /// Public URL prefix for stored artifacts. None yields file:// URLs.
    pub public_base_url: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("shipshow/", env!("CARGO_PKG_VERSION")).to_string(),
            max_page_bytes: 20_000,
            default_voice: "nova".to_string(),
            tts_model: "tts-1".to_string(),
            video_endpoint: None,
            video_api_key_env: "VIDEO_API_KEY".to_string(),
            public_base_url: None,
        }
    }
}

/// Audit log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Persist finished runs.
    pub enabled: bool,
    /// Path to the SQLite audit database.
    pub sqlite_path: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_path: "~/.shipshow/runs.db".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom agent prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ShipShowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shipshow")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Directory where generated audio and video are stored.
    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir().join("artifacts")
    }

    /// Get the expanded SQLite audit database path.
    pub fn audit_path(&self) -> PathBuf {
        Self::expand_path(&self.audit.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [workflow]
            max_steps = 12
            required_tools = ["generate_audio", "generate_video"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.workflow.max_steps, 12);
        assert_eq!(
            settings.workflow.required_tools,
            vec![ToolId::GenerateAudio, ToolId::GenerateVideo]
        );
        assert_eq!(settings.workflow.start_agent, "coordinator");
        assert_eq!(settings.openai.model, "gpt-4.1");
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.tools.video_endpoint = Some("https://video.example.com/render".to_string());
        settings.workflow.context_window = Some(30);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(
            loaded.tools.video_endpoint.as_deref(),
            Some("https://video.example.com/render")
        );
        assert_eq!(loaded.workflow.context_window, Some(30));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/shipshow/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.workflow.required_tools, vec![ToolId::GenerateVideo]);
    }
}
