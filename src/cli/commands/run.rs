//! Run command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{output::format_duration, Output};
use crate::config::Settings;
use crate::stream::{collect, event_stream};
use crate::workflow::{EngineConfig, RunStatus, WorkflowEngine};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;

/// Run the pipeline on a brief.
pub async fn run_pipeline(
    prompt: &str,
    json: bool,
    max_steps: Option<usize>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Run, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }
    if !json {
        for warning in preflight::warnings(&settings) {
            Output::warning(&warning);
        }
    }

    let mut engine = WorkflowEngine::from_settings(&settings)?;
    if let Some(max_steps) = max_steps {
        engine = engine
            .with_config(EngineConfig::from_settings(&settings.workflow).with_max_steps(max_steps));
    }
    let engine = Arc::new(engine);

    let handle = engine.spawn(vec![prompt.to_string()])?;

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            Output::warning("Cancelling after the current step...");
            cancel.cancel();
        }
    });

    if json {
        let spinner = Output::spinner("Running pipeline...");
        let run = collect(handle.run_id, handle.events).await;
        let outcome = handle.join.await?;
        spinner.finish_and_clear();
        println!("{}", serde_json::to_string_pretty(&run)?);
        if let RunStatus::Failed { error } = outcome.status {
            anyhow::bail!("Run failed: {}", error);
        }
        return Ok(());
    }

    let mut events = event_stream(handle.events);
    while let Some(event) = events.next().await {
        Output::event(&event);
    }
    let outcome = handle.join.await?;

    let elapsed = (outcome.finished_at - outcome.started_at).num_milliseconds() as f64 / 1000.0;
    match &outcome.status {
        RunStatus::Completed { output } => {
            println!("\n{}\n", output);

            let artifacts = &outcome.artifacts;
            if !artifacts.is_empty() {
                Output::header("Deliverables");
                for (key, url) in &artifacts.video {
                    Output::kv(&format!("video/{}", key), url);
                }
                for (key, url) in &artifacts.audio {
                    Output::kv(&format!("audio/{}", key), url);
                }
                println!();
            }

            Output::info(&format!(
                "Completed in {} step(s), {}",
                outcome.steps,
                format_duration(elapsed)
            ));
            Ok(())
        }
        RunStatus::Failed { error } => {
            Output::info(&format!("Stopped after {} step(s)", outcome.steps));
            Err(anyhow::anyhow!("Run failed: {}", error))
        }
    }
}
