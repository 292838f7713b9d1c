//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/swarm-dashboard/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/swarm-dashboard/` (~/.config/swarm-dashboard/)
//! - State/Logs: `$XDG_STATE_HOME/swarm-dashboard/` (~/.local/state/swarm-dashboard/)

use crate::error::{Error, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the swarm lives on disk
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Liveness classification thresholds
    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    /// Parse result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Bounds on per-agent retained data
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Completion marker phrases
    #[serde(default)]
    pub markers: MarkersConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agents in the swarm
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

/// Swarm location settings
#[derive(Debug, Deserialize, Clone)]
pub struct SwarmConfig {
    /// Display name for the swarm
    #[serde(default = "default_swarm_name")]
    pub name: String,

    /// Directory holding one sub-directory per agent
    #[serde(default = "default_swarm_dir")]
    pub swarm_dir: PathBuf,

    /// Directory where task runners write `<task_id>.output` files
    #[serde(default = "default_task_dir")]
    pub task_dir: PathBuf,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            name: default_swarm_name(),
            swarm_dir: default_swarm_dir(),
            task_dir: default_task_dir(),
        }
    }
}

fn default_swarm_name() -> String {
    "Agent Swarm".to_string()
}

fn default_swarm_dir() -> PathBuf {
    PathBuf::from("/workspace/project")
}

fn default_task_dir() -> PathBuf {
    PathBuf::from("/tmp/claude-1000")
}

/// Liveness thresholds, in seconds of age since the last event.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ThresholdsConfig {
    /// Younger than this is running
    #[serde(default = "default_active_secs")]
    pub active_secs: u64,

    /// Younger than this (and not running) is idle, older is stale
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,

    /// Enable the presumed-done heuristic
    #[serde(default = "default_presumed_done_enabled")]
    pub presumed_done_enabled: bool,

    /// Silence after which a busy agent is presumed done
    #[serde(default = "default_presumed_done_secs")]
    pub presumed_done_secs: u64,

    /// Events an agent must have produced before it can be presumed done
    #[serde(default = "default_presumed_done_min_events")]
    pub presumed_done_min_events: u64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            active_secs: default_active_secs(),
            idle_secs: default_idle_secs(),
            presumed_done_enabled: default_presumed_done_enabled(),
            presumed_done_secs: default_presumed_done_secs(),
            presumed_done_min_events: default_presumed_done_min_events(),
        }
    }
}

impl ThresholdsConfig {
    pub fn active(&self) -> Duration {
        Duration::seconds(self.active_secs as i64)
    }

    pub fn idle(&self) -> Duration {
        Duration::seconds(self.idle_secs as i64)
    }

    pub fn presumed_done(&self) -> Duration {
        Duration::seconds(self.presumed_done_secs as i64)
    }

    /// Validate ordering of the thresholds
    pub fn validate(&self) -> Result<()> {
        if self.active_secs == 0 {
            return Err(Error::Config(
                "thresholds.active_secs must be greater than 0".to_string(),
            ));
        }
        if self.idle_secs <= self.active_secs {
            return Err(Error::Config(
                "thresholds.idle_secs must be greater than thresholds.active_secs".to_string(),
            ));
        }
        if self.presumed_done_enabled && self.presumed_done_secs <= self.idle_secs {
            return Err(Error::Config(
                "thresholds.presumed_done_secs must be greater than thresholds.idle_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn default_active_secs() -> u64 {
    60
}

fn default_idle_secs() -> u64 {
    120
}

fn default_presumed_done_enabled() -> bool {
    true
}

fn default_presumed_done_secs() -> u64 {
    600
}

fn default_presumed_done_min_events() -> u64 {
    10
}

/// Parse result cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached read batches
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    50
}

/// Bounds on what is kept per agent
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Size of the recent activity ring buffer
    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,

    /// Activity descriptions are truncated to this many characters
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Touched files listed on a snapshot
    #[serde(default = "default_max_files_listed")]
    pub max_files_listed: usize,

    /// Timeout for a single log read
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_recent_events: default_max_recent_events(),
            max_content_length: default_max_content_length(),
            max_files_listed: default_max_files_listed(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

fn default_max_recent_events() -> usize {
    30
}

fn default_max_content_length() -> usize {
    200
}

fn default_max_files_listed() -> usize {
    20
}

fn default_io_timeout_ms() -> u64 {
    2000
}

/// Phrases that mark an agent as finished when they appear in an event's text
#[derive(Debug, Deserialize, Clone)]
pub struct MarkersConfig {
    #[serde(default = "default_completion_phrases")]
    pub completion_phrases: Vec<String>,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            completion_phrases: default_completion_phrases(),
        }
    }
}

fn default_completion_phrases() -> Vec<String> {
    [
        "EVOLUTION COMPLETE",
        "Task completed",
        "All tasks completed",
        "Successfully completed",
        "Finished all",
        "Done!",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Log directory (default: the XDG state directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Also print warnings and errors to stderr
    #[serde(default)]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            dir: None,
            stderr: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// One agent of the swarm
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AgentSpec {
    /// Unique agent id; also the name of its directory under `swarm_dir`
    pub id: String,

    #[serde(default = "default_role")]
    pub role: String,

    /// Launch wave the agent belongs to
    #[serde(default = "default_wave")]
    pub wave: u32,

    /// Task runner id, used to find `<task_dir>/<task_id>.output`
    #[serde(default)]
    pub task_id: Option<String>,

    #[serde(default)]
    pub mission: String,

    /// Explicit log file, bypasses discovery
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: default_role(),
            wave: default_wave(),
            task_id: None,
            mission: String::new(),
            log_path: None,
        }
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

fn default_role() -> String {
    "Unknown".to_string()
}

fn default_wave() -> u32 {
    1
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if self.cache.capacity == 0 {
            return Err(Error::Config(
                "cache.capacity must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_recent_events == 0 {
            return Err(Error::Config(
                "limits.max_recent_events must be greater than 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(Error::Config("agent id must not be empty".to_string()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(Error::Config(format!("duplicate agent id: {}", agent.id)));
            }
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/swarm-dashboard/config.toml` (~/.config/swarm-dashboard/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home()
            .join("swarm-dashboard")
            .join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/swarm-dashboard/` (~/.local/state/swarm-dashboard/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("swarm-dashboard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.thresholds.active_secs, 60);
        assert_eq!(config.thresholds.idle_secs, 120);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.limits.max_recent_events, 30);
        assert_eq!(config.limits.max_content_length, 200);
        assert!(config.agents.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[swarm]
name = "Evolution Swarm"
swarm_dir = "/srv/swarm"

[thresholds]
active_secs = 30
idle_secs = 90

[cache]
capacity = 8

[logging]
level = "debug"

[[agents]]
id = "agent-1"
role = "Researcher"
wave = 2
task_id = "b1f3"

[[agents]]
id = "agent-2"
log_path = "/var/log/agent-2.jsonl"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.swarm.name, "Evolution Swarm");
        assert_eq!(config.swarm.swarm_dir, PathBuf::from("/srv/swarm"));
        assert_eq!(config.swarm.task_dir, PathBuf::from("/tmp/claude-1000"));
        assert_eq!(config.thresholds.active_secs, 30);
        assert_eq!(config.thresholds.presumed_done_secs, 600);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].wave, 2);
        assert_eq!(config.agents[0].task_id.as_deref(), Some("b1f3"));
        assert_eq!(config.agents[1].role, "Unknown");
        assert_eq!(
            config.agents[1].log_path.as_deref(),
            Some(Path::new("/var/log/agent-2.jsonl"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let thresholds = ThresholdsConfig {
            active_secs: 120,
            idle_secs: 60,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());

        let thresholds = ThresholdsConfig {
            presumed_done_secs: 100,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());

        let thresholds = ThresholdsConfig {
            presumed_done_enabled: false,
            presumed_done_secs: 0,
            ..Default::default()
        };
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_agent_ids_rejected() {
        let config = Config {
            agents: vec![AgentSpec::new("a"), AgentSpec::new("a")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\ncapacity = 3\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache.capacity, 3);

        std::fs::write(&path, "[cache]\ncapacity = \"many\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
