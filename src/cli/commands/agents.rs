//! Agents command implementation.

use crate::agents::AgentGraph;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use console::style;

/// List the agent graph.
pub fn run_agents(settings: &Settings) -> Result<()> {
    let graph = AgentGraph::from_settings(settings)?;

    Output::header(&format!("Agents ({})", graph.len()));
    println!();

    for spec in graph.agents() {
        let marker = if spec.id() == graph.start() {
            style("start").green().to_string()
        } else if spec.is_terminal() {
            style("terminal").yellow().to_string()
        } else {
            String::new()
        };
        println!("  {} {} {}", style(spec.name()).bold(), style(spec.id()).dim(), marker);

        if !spec.allowed_tools().is_empty() {
            let tools: Vec<_> = spec.allowed_tools().iter().map(|t| t.as_str()).collect();
            Output::kv("    tools", &tools.join(", "));
        }
        if !spec.allowed_handoffs().is_empty() {
            let targets: Vec<_> = spec.allowed_handoffs().iter().map(|a| a.as_str()).collect();
            Output::kv("    hands off to", &targets.join(", "));
        }
    }

    let required = graph.guard().required_tools();
    if !required.is_empty() {
        println!();
        let tools: Vec<_> = required.iter().map(|t| t.as_str()).collect();
        Output::info(&format!("A run can only finish after {} succeeded", tools.join(", ")));
    }

    Ok(())
}
