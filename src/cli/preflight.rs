//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway through a run.

use crate::config::Settings;
use crate::error::{Result, ShipShowError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A run needs the API key for decisions and speech.
    Run,
    /// The server runs pipelines on request.
    Serve,
    /// Listing agents and history needs nothing external.
    Inspect,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Run | Operation::Serve => {
            check_api_key()?;
            check_workflow(settings)?;
        }
        Operation::Inspect => {}
    }
    Ok(())
}

/// Warnings that do not block a run but will likely end it early.
pub fn warnings(settings: &Settings) -> Vec<String> {
    let mut warnings = Vec::new();
    if settings.tools.video_endpoint.is_none() {
        warnings.push(
            "tools.video_endpoint is not set; generate_video will fail and runs requiring video cannot complete"
                .to_string(),
        );
    }
    warnings
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(ShipShowError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(ShipShowError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

fn check_workflow(settings: &Settings) -> Result<()> {
    if settings.workflow.max_steps == 0 {
        return Err(ShipShowError::Config(
            "workflow.max_steps must be at least 1".to_string(),
        ));
    }
    if settings.workflow.decision_timeout_secs == 0 || settings.workflow.tool_timeout_secs == 0 {
        return Err(ShipShowError::Config(
            "workflow timeouts must be at least 1 second".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_has_no_requirements() {
        assert!(check(Operation::Inspect, &Settings::default()).is_ok());
    }

    #[test]
    fn test_zero_step_ceiling_is_rejected() {
        let mut settings = Settings::default();
        settings.workflow.max_steps = 0;
        assert!(check_workflow(&settings).is_err());
        assert!(check_workflow(&Settings::default()).is_ok());
    }

    #[test]
    fn test_missing_video_endpoint_warns() {
        let mut settings = Settings::default();
        assert_eq!(warnings(&settings).len(), 1);
        settings.tools.video_endpoint = Some("https://render.example.com/v1/render".to_string());
        assert!(warnings(&settings).is_empty());
    }
}
