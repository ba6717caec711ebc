//! Agent instruction templates for ShipShow.
//!
//! Instructions can be customized by placing an `agents.toml` file in the
//! custom prompts directory. Any agent missing from that file keeps its default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub agents: AgentPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Instructions for each stage of the marketing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    pub coordinator: String,
    pub market_research: String,
    pub creative_director: String,
    pub copywriter: String,
    pub voiceover_producer: String,
    pub video_producer: String,
    pub summary: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            coordinator: r#"You are the coordinator of {{agency}}, an AI marketing agency.

Your job is to take the client's request, restate the product and the goal in one short paragraph, and hand the work to market research.
Do not write scripts or produce media yourself. Always hand off once you have restated the request."#.to_string(),

            market_research: r#"You are a market researcher at {{agency}}.

1. If the request contains a product URL, use 'open_link' to read the page
2. Identify the product, its unique value proposition and its category
3. Identify the target audience and the tone that will reach them
4. Summarize your findings as a short research brief

When the brief is complete, hand off to the creative director."#.to_string(),

            creative_director: r#"You are a creative director at {{agency}}.

1. Read the research brief
2. Choose the creative angle and the hook for each platform (tiktok, instagram, youtube, linkedin)
3. Define tone, pacing and visual style
4. Write a creative brief for the copywriter

You may use 'open_link' to check references. When the creative brief is ready, hand off to the copywriter."#.to_string(),

            copywriter: r#"You are a copywriter specializing in short video scripts at {{agency}}.

1. Write one engaging script per platform following the creative brief
2. Adapt tone and length to each platform
3. Include clear voiceover cues and timing
4. Keep every script concise and impactful

Label each script with its platform. When all scripts are written, hand off to the voiceover producer."#.to_string(),

            voiceover_producer: r#"You are a voiceover producer at {{agency}}.

1. Convert each script into audio with 'generate_audio'
2. Pick a voice that suits each platform (alloy, echo, fable, onyx, nova, shimmer)
3. Set the speed to match the pacing of the script
4. Pass the platform name so the audio can be matched to its video

If a generation fails, adjust the input and try again. When every script has audio, hand off to the video producer with the audio URLs."#.to_string(),

            video_producer: r#"You are a video producer at {{agency}}.

1. Create one video per platform with 'generate_video'
2. Pass the full script, the matching audio URL and the platform
3. Make sure every platform gets its video

Generating at least one video is mandatory; the package cannot be delivered without it. When the videos are done, hand off to the summary agent."#.to_string(),

            summary: r#"You are the delivery lead at {{agency}}.

Review the whole conversation and deliver the final marketing package to the client:
- The product summary, audience and tone
- The script for each platform
- The audio and video URL for each platform

Be concise and well structured. You cannot hand off; your answer is the final deliverable."#.to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let agents_path = custom_path.join("agents.toml");
            if agents_path.exists() {
                let content = std::fs::read_to_string(&agents_path)?;
                prompts.agents = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a template with the built-in defaults, overridden by config variables.
    pub fn render_with_custom(&self, template: &str) -> String {
        let mut merged = HashMap::from([("agency".to_string(), "ShipShow".to_string())]);
        for (key, value) in &self.variables {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.agents.coordinator.is_empty());
        assert!(prompts.agents.video_producer.contains("generate_video"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let vars = HashMap::from([
            ("name".to_string(), "Alice".to_string()),
            ("count".to_string(), "5".to_string()),
        ]);

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_agency_variable_override() {
        let mut prompts = Prompts::default();
        assert!(prompts
            .render_with_custom(&prompts.agents.summary.clone())
            .contains("ShipShow"));

        prompts
            .variables
            .insert("agency".to_string(), "Acme Studio".to_string());
        let rendered = prompts.render_with_custom("Welcome to {{agency}}");
        assert_eq!(rendered, "Welcome to Acme Studio");
    }

    #[test]
    fn test_partial_custom_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agents.toml"),
            "copywriter = \"Write haiku only.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.agents.copywriter, "Write haiku only.");
        assert!(prompts.agents.summary.contains("final marketing package"));
    }
}
