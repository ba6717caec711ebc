//! CLI command implementations.

mod agents;
mod config;
mod history;
mod run;
mod serve;

pub use agents::run_agents;
pub use config::run_config;
pub use history::run_history;
pub use run::run_pipeline;
pub use serve::run_serve;
