//! ShipShow - Multi-agent Marketing Video Pipeline
//!
//! A sequential workflow engine that hands a marketing brief from one agent to
//! the next: research, creative direction, copy, voiceover and video.
//!
//! # Overview
//!
//! ShipShow allows you to:
//! - Define agents as data: instructions, granted tools and handoff targets
//! - Run a brief through the agent graph with a bounded number of steps
//! - Require that certain tools (video rendering by default) succeeded before
//!   a run may finish
//! - Stream run events over SSE or collect them into one result
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and agent prompts
//! - `tools` - Page fetching, speech synthesis and video rendering adapters
//! - `agents` - Agent specs and the validated agent graph
//! - `workflow` - The run state machine and the decision seam
//! - `stream` - Run events, incremental and aggregated delivery
//! - `audit` - Persistent log of finished runs
//!
//! # Example
//!
//! ```rust,no_run
//! use shipshow::config::Settings;
//! use shipshow::stream::collect;
//! use shipshow::workflow::WorkflowEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let engine = Arc::new(WorkflowEngine::from_settings(&settings)?);
//!
//!     let handle = engine.spawn(vec!["Launch videos for https://acme.test/skates".to_string()])?;
//!     let run = collect(handle.run_id, handle.events).await;
//!     println!("{:?}: {:?}", run.status, run.output);
//!
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod openai;
pub mod stream;
pub mod tools;
pub mod workflow;

pub use error::{Result, ShipShowError};
