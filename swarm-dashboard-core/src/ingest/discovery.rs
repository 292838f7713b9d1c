//! Locating an agent's active log file
//!
//! Search order:
//! 1. explicit `log_path` from the agent's config
//! 2. `<swarm_dir>/<id>/output.jsonl` (usually a symlink placed by the launcher)
//! 3. `<task_dir>/<task_id>.output`
//! 4. `<swarm_dir>/<id>/*.output`, then `<swarm_dir>/<id>/*.jsonl` (first in sorted order)

use crate::config::{AgentSpec, SwarmConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Sidecar file an agent may write to report its own status.
pub const STATUS_FILE: &str = "status.json";

/// Directory owned by `agent` inside the swarm.
pub fn agent_dir(swarm: &SwarmConfig, agent: &AgentSpec) -> PathBuf {
    swarm.swarm_dir.join(&agent.id)
}

/// Find the log file for `agent`, or `None` if it has not produced one yet.
pub fn find_agent_log(swarm: &SwarmConfig, agent: &AgentSpec) -> Result<Option<PathBuf>> {
    if let Some(path) = &agent.log_path {
        return Ok(Some(path.clone()));
    }

    let dir = agent_dir(swarm, agent);

    let preferred = dir.join("output.jsonl");
    if preferred.exists() {
        return Ok(Some(preferred));
    }

    if let Some(task_id) = &agent.task_id {
        let task_output = swarm.task_dir.join(format!("{}.output", task_id));
        if task_output.exists() {
            return Ok(Some(task_output));
        }
    }

    for pattern in ["*.output", "*.jsonl"] {
        if let Some(found) = first_match(&dir, pattern)? {
            return Ok(Some(found));
        }
    }

    tracing::trace!(agent = %agent.id, dir = %dir.display(), "No log file yet");
    Ok(None)
}

fn first_match(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped, pattern);

    let entries = glob::glob(&full_pattern)
        .map_err(|e| Error::Config(format!("Invalid glob pattern {}: {}", full_pattern, e)))?;

    let mut matches: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
