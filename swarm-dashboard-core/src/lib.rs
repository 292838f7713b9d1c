//! # swarm-dashboard-core
//!
//! Core library for swarm-dashboard - a live status monitor for a swarm of
//! independently running agents.
//!
//! This library provides:
//! - Incremental, rotation-aware tailing of newline-delimited JSON agent logs
//! - A bounded LRU cache of parse results
//! - Liveness classification (pending, running, idle, stale, completed)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Agents are observed only through their logs:
//! - **Ingest:** locate each agent's log, resume from the committed cursor,
//!   decode only the newly appended complete lines
//! - **Fold:** accumulate events into a per-agent state
//! - **Classify:** derive a status from that state and the wall clock
//!
//! ## Example
//!
//! ```rust,no_run
//! use swarm_dashboard_core::{Config, SwarmMonitor};
//!
//! # async fn run() -> swarm_dashboard_core::Result<()> {
//! let config = Config::load()?;
//! let monitor = SwarmMonitor::new(config)?;
//!
//! let summary = monitor.swarm_status().await;
//! println!("{}% of agents completed", summary.overall_progress);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{AgentSpec, Config};
pub use error::{Error, Result};
pub use monitor::SwarmMonitor;
pub use types::*;

// Public modules
pub mod activity;
pub mod classify;
pub mod config;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod monitor;
pub mod types;
