//! History command implementation.

use crate::audit::{RunStore, SqliteRunStore};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::ShipShowError;
use crate::workflow::{Artifacts, ToolOutcome, Transcript, Turn};
use anyhow::Result;
use uuid::Uuid;

/// Show past runs, or one run in full.
pub async fn run_history(run_id: Option<&str>, limit: usize, settings: &Settings) -> Result<()> {
    let path = settings.audit_path();
    if !path.exists() {
        Output::info("No runs recorded yet.");
        return Ok(());
    }
    let store = SqliteRunStore::new(&path)?;

    let Some(run_id) = run_id else {
        let runs = store.list(limit).await?;
        if runs.is_empty() {
            Output::info("No runs recorded yet.");
            return Ok(());
        }

        Output::header(&format!("Recent runs ({})", runs.len()));
        println!();
        for run in &runs {
            Output::run_line(
                &run.run_id.to_string(),
                &run.status,
                &run.finished_at.format("%Y-%m-%d %H:%M").to_string(),
                &run.output,
            );
        }
        return Ok(());
    };

    let id = Uuid::parse_str(run_id)
        .map_err(|e| ShipShowError::InvalidInput(format!("Invalid run id {}: {}", run_id, e)))?;
    let record = store
        .get(id)
        .await?
        .ok_or_else(|| ShipShowError::RunNotFound(run_id.to_string()))?;

    Output::header(&format!("Run {}", record.run_id));
    Output::kv("Status", &record.status);
    if let Some(kind) = record.error_kind {
        Output::kv("Error", kind.as_str());
    }
    Output::kv("Started", &record.started_at.to_rfc3339());
    Output::kv("Finished", &record.finished_at.to_rfc3339());

    let transcript: Transcript = serde_json::from_str(&record.transcript_json)?;
    Output::header("Transcript");
    for turn in &transcript {
        print_turn(turn);
    }

    let artifacts: Artifacts = serde_json::from_str(&record.artifacts_json)?;
    if !artifacts.is_empty() {
        Output::header("Deliverables");
        for (key, url) in artifacts.video.iter().chain(artifacts.audio.iter()) {
            Output::kv(key, url);
        }
    }

    println!("\n{}", record.output);
    Ok(())
}

fn print_turn(turn: &Turn) {
    match turn {
        Turn::UserMessage { text } => Output::kv("user", text),
        Turn::AgentMessage { agent, text } => Output::kv(agent.as_str(), text),
        Turn::ToolCall {
            agent, tool, arguments, ..
        } => Output::list_item(&format!("{} called {} {}", agent, tool, arguments)),
        Turn::ToolResult { tool, outcome, .. } => match outcome {
            ToolOutcome::Success { .. } => Output::list_item(&format!("{} succeeded", tool)),
            ToolOutcome::Failure { error } => Output::list_item(&format!("{} failed: {}", tool, error)),
        },
        Turn::Handoff { from, to } => Output::info(&format!("{} -> {}", from, to)),
    }
}
