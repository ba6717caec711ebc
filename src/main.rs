//! ShipShow CLI entry point.

use anyhow::Result;
use clap::Parser;
use shipshow::cli::{commands, Cli, Commands};
use shipshow::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config_path();
    let settings = Settings::load_from(Some(&config_path))?;

    // Initialize logging; -v flags override the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("shipshow={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.artifact_dir())?;

    // Execute command
    match &cli.command {
        Commands::Run {
            prompt,
            json,
            max_steps,
        } => {
            commands::run_pipeline(prompt, *json, *max_steps, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Agents => {
            commands::run_agents(&settings)?;
        }

        Commands::History { run_id, limit } => {
            commands::run_history(run_id.as_deref(), *limit, &settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, &config_path)?;
        }
    }

    Ok(())
}
