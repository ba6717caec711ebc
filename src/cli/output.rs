//! CLI output formatting utilities.

use crate::stream::{RunEvent, RunEventKind};
use crate::workflow::ToolOutcome;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one line of a run listing.
    pub fn run_line(run_id: &str, status: &str, finished: &str, output: &str) {
        let status = if status == "completed" {
            style(status).green()
        } else {
            style(status).red()
        };
        println!(
            "  {} {} {} {}",
            style(run_id).bold(),
            status,
            style(finished).dim(),
            content_preview(output, 60)
        );
    }

    /// Print a run event as one progress line.
    pub fn event(event: &RunEvent) {
        match &event.kind {
            RunEventKind::RunStarted { agent } => {
                Self::info(&format!("Run {} started with {}", event.run_id, style(agent).bold()));
            }
            RunEventKind::AgentSwitched { from, to } => {
                println!("{} {} -> {}", style(">>").cyan().bold(), from, style(to).bold());
            }
            RunEventKind::ToolCalled { agent, tool, .. } => {
                println!("   {} {} calls {}", style("~").yellow(), agent, style(tool).cyan());
            }
            RunEventKind::ToolResult { tool, outcome, .. } => match outcome {
                ToolOutcome::Success { .. } => {
                    println!("   {} {} succeeded", style("+").green(), tool);
                }
                ToolOutcome::Failure { error } => {
                    println!("   {} {} failed: {}", style("!").red(), tool, error);
                }
            },
            RunEventKind::TextDelta { agent, text } => {
                println!("   {} {}", style(format!("[{}]", agent)).dim(), content_preview(text, 200));
            }
            RunEventKind::RunCompleted { .. } => {
                Self::success(&format!("Run {} completed", event.run_id));
            }
            RunEventKind::RunFailed { error, message } => {
                Self::error(&format!("Run {} failed ({}): {}", event.run_id, error, message));
            }
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.0), "42s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(3725.0), "1h 2m 5s");
    }

    #[test]
    fn test_content_preview_respects_char_boundaries() {
        assert_eq!(content_preview("short", 10), "short");
        assert_eq!(content_preview("héllo wörld", 5), "héllo...");
        assert_eq!(content_preview("a\nb", 10), "a b");
    }
}
