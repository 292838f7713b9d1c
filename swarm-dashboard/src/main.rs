//! swarm-status - report the live status of every agent in a swarm
//!
//! Each run tails the agents' logs incrementally and classifies them as
//! pending, running, idle, stale or completed.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/swarm-dashboard/swarm-dashboard.log (~/.local/state/swarm-dashboard/)
//! - Config: $XDG_CONFIG_HOME/swarm-dashboard/config.toml (~/.config/swarm-dashboard/config.toml)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use swarm_dashboard_core::format::{format_relative_time_opt, truncate_chars};
use swarm_dashboard_core::{
    AgentSnapshot, AgentStatus, CompletionSource, Config, SwarmMonitor, SwarmSummary,
};

/// Recent activity entries shown in the single-agent view
const DETAIL_ACTIVITY: usize = 10;

#[derive(Parser)]
#[command(name = "swarm-status")]
#[command(about = "Show the live status of every agent in a swarm")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/swarm-dashboard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show a single agent in detail
    #[arg(short, long)]
    agent: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Watch mode - keep polling until Ctrl+C, re-reading the agent list each poll
    #[arg(short, long)]
    watch: bool,

    /// Poll interval in milliseconds, at least 100 (only with --watch)
    #[arg(long, default_value = "5000")]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    let _log_guard = swarm_dashboard_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("swarm-status starting");

    let monitor = SwarmMonitor::new(config).context("failed to start swarm monitor")?;

    if args.watch {
        run_watch_mode(&monitor, &args).await
    } else {
        report(&monitor, &args).await
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Config::load().context("failed to load configuration"),
    }
}

/// Pick up agents added to or removed from the config file since the last poll
async fn reload_agents(monitor: &SwarmMonitor, args: &Args) {
    match load_config(args.config.as_deref()) {
        Ok(config) => {
            if let Err(e) = monitor.sync_agents(&config.agents).await {
                tracing::warn!(error = %e, "Some configured agents could not be registered");
            }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::warn!(error = %reason, "Config reload failed, keeping current agents");
        }
    }
}

/// Query once and print the result
async fn report(monitor: &SwarmMonitor, args: &Args) -> Result<()> {
    match &args.agent {
        Some(agent_id) => {
            let snapshot = monitor
                .agent_status(agent_id)
                .await
                .with_context(|| format!("failed to query agent {}", agent_id))?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_agent(&snapshot, Utc::now());
            }
        }
        None => {
            let summary = monitor.swarm_status().await;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
    }
    Ok(())
}

/// Run continuous watch mode
async fn run_watch_mode(monitor: &SwarmMonitor, args: &Args) -> Result<()> {
    let interval_ms = args.interval.max(100);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if !args.json {
        println!(
            "Watch mode active (poll every {}ms). Press Ctrl+C to stop.",
            interval_ms
        );
        println!();
    }

    let mut iteration = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                iteration += 1;
                if iteration > 1 {
                    reload_agents(monitor, args).await;
                }
                report(monitor, args).await?;
                if !args.json {
                    println!();
                }
                tracing::debug!(iteration, "Watch poll complete");
            }
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl+C")?;
                eprintln!("\nShutting down...");
                break;
            }
        }
    }

    let stats = monitor.cache_stats();
    tracing::info!(
        iterations = iteration,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        cache_evictions = stats.evictions,
        "swarm-status watch stopped"
    );
    Ok(())
}

fn status_label(snapshot: &AgentSnapshot) -> String {
    let mut label = match (snapshot.status, snapshot.completion) {
        (AgentStatus::Completed, Some(CompletionSource::Presumed)) => {
            "completed (presumed)".to_string()
        }
        (status, _) => status.to_string(),
    };
    if snapshot.degraded {
        label.push('!');
    }
    label
}

fn print_summary(summary: &SwarmSummary) {
    let now = summary.generated_at;
    let completed = summary.count(AgentStatus::Completed);

    println!("Swarm: {}", summary.swarm_name);
    println!(
        "Progress: {}% ({}/{} completed)",
        summary.overall_progress, completed, summary.total_agents
    );
    println!(
        "{}",
        AgentStatus::ALL
            .iter()
            .map(|s| format!("{} {}", s, summary.count(*s)))
            .collect::<Vec<_>>()
            .join("  ")
    );

    if summary.total_agents == 0 {
        println!("\nNo agents configured.");
        return;
    }

    println!();
    println!(
        "{:<5} {:<20} {:<16} {:<22} {:<12} {:>7} {:>5}",
        "WAVE", "AGENT", "ROLE", "STATUS", "LAST EVENT", "EVENTS", "PROG"
    );

    for (wave, agents) in summary.agents_by_wave() {
        for agent in agents {
            println!(
                "{:<5} {:<20} {:<16} {:<22} {:<12} {:>7} {:>4}%",
                wave,
                truncate_chars(&agent.id, 20),
                truncate_chars(&agent.role, 16),
                status_label(agent),
                format_relative_time_opt(agent.last_event_at, now),
                agent.total_events,
                agent.progress
            );
        }
    }

    let degraded: Vec<&AgentSnapshot> = summary.agents.values().filter(|a| a.degraded).collect();
    if !degraded.is_empty() {
        println!();
        for agent in degraded {
            println!(
                "! {}: {}",
                agent.id,
                agent.error.as_deref().unwrap_or("log unavailable")
            );
        }
    }
}

fn print_agent(snapshot: &AgentSnapshot, now: DateTime<Utc>) {
    println!("Agent:       {}", snapshot.id);
    println!("Role:        {}", snapshot.role);
    println!("Wave:        {}", snapshot.wave);
    if !snapshot.mission.is_empty() {
        println!("Mission:     {}", snapshot.mission);
    }
    println!("Status:      {}", status_label(snapshot));
    println!(
        "Last event:  {}",
        format_relative_time_opt(snapshot.last_event_at, now)
    );
    println!("Progress:    {}%", snapshot.progress);
    println!(
        "Events:      {} ({} malformed lines)",
        snapshot.total_events, snapshot.malformed_lines
    );
    if let Some(path) = &snapshot.log_path {
        println!("Log:         {}", path.display());
    }
    if let Some(error) = &snapshot.error {
        println!("Error:       {}", error);
    }

    if !snapshot.tool_usage.is_empty() {
        let mut tools: Vec<(&String, &u64)> = snapshot.tool_usage.iter().collect();
        tools.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        println!("\nTools:");
        for (name, count) in tools {
            println!("  {:<16} {}", name, count);
        }
    }

    if snapshot.files_touched_total > 0 {
        println!("\nFiles touched ({}):", snapshot.files_touched_total);
        for file in &snapshot.files_touched {
            println!("  {}", file);
        }
        let hidden = snapshot.files_touched_total - snapshot.files_touched.len();
        if hidden > 0 {
            println!("  ... and {} more", hidden);
        }
    }

    if !snapshot.recent_activity.is_empty() {
        println!("\nRecent activity:");
        let skip = snapshot.recent_activity.len().saturating_sub(DETAIL_ACTIVITY);
        for entry in snapshot.recent_activity.iter().skip(skip) {
            let what = entry.tool.as_deref().unwrap_or(&entry.kind);
            println!(
                "  [{:>9}] {:<12} {}",
                format_relative_time_opt(entry.timestamp, now),
                truncate_chars(what, 12),
                truncate_chars(&entry.content.replace('\n', " "), 80)
            );
        }
    }
}
