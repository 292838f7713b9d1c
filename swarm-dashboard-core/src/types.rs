//! Core domain types for swarm-dashboard
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Agent** | An independently running worker process, observed only through its log |
//! | **Event** | One decoded line of an agent's newline-delimited JSON log |
//! | **Fingerprint** | Cheap summary of a file's identity used to spot rotation/truncation |
//! | **Cursor** | The committed byte offset marking how much of a file has been consumed |
//! | **Completion marker** | An event (or sidecar status file) saying the agent has finished |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================
// Files
// ============================================

/// Platform file identity (device + inode on Unix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Snapshot of a log file's identity and extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes
    pub len: u64,
    /// Last modification time, if the platform reports one
    pub modified_at: Option<DateTime<Utc>>,
    /// Device/inode, if the platform reports one
    pub identity: Option<FileIdentity>,
}

impl Fingerprint {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::from),
            identity: FileIdentity::from_metadata(metadata),
        }
    }

    /// Stat `path` and fingerprint it.
    pub fn of_path(path: &std::path::Path) -> std::io::Result<Self> {
        std::fs::metadata(path).map(|m| Self::from_metadata(&m))
    }

    /// Whether `self` describes the same file as `previous`, possibly grown.
    ///
    /// A different inode means the file was replaced (rotation). A size below
    /// the previous size or below the committed offset means it was truncated.
    /// A modification time earlier than the previous one means the file was
    /// rewritten from an older copy.
    ///
    /// A file truncated in place and rewritten past its old size between two
    /// checks, with a newer mtime, still looks like growth; reading then
    /// resumes inside the new content.
    pub fn is_continuation_of(&self, previous: &Fingerprint, committed_offset: u64) -> bool {
        if let (Some(now), Some(before)) = (self.identity, previous.identity) {
            if now != before {
                return false;
            }
        }
        if let (Some(now), Some(before)) = (self.modified_at, previous.modified_at) {
            if now < before {
                return false;
            }
        }
        self.len >= previous.len && self.len >= committed_offset
    }
}

/// Read-tracking state for one log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    /// Committed byte offset; everything before it has been consumed
    pub offset: u64,
}

// ============================================
// Events
// ============================================

/// Broad classification of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A tool invocation (Read, Write, Bash, ...)
    ToolUse,
    /// A file was written or edited
    FileWrite,
    /// The agent reports its own status
    StatusMarker,
    /// Anything else: assistant text, system chatter, results
    Message,
}

impl EventKind {
    /// Map the `kind`/`type` field of a log line onto an event kind.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "tool_use" | "tool" | "tool_call" => EventKind::ToolUse,
            "file_write" | "file_edit" | "write" => EventKind::FileWrite,
            "status" | "status_marker" | "result" => EventKind::StatusMarker,
            _ => EventKind::Message,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ToolUse => "tool_use",
            EventKind::FileWrite => "file_write",
            EventKind::StatusMarker => "status_marker",
            EventKind::Message => "message",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One decoded log line.
///
/// The payload keeps the whole JSON object; each kind reads the fields it
/// understands from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: EventKind,
    /// The `kind`/`type` string as written, empty if absent
    pub raw_kind: String,
    /// Byte offset of the start of the line
    pub offset: u64,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl EventRecord {
    /// String field from the payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

// ============================================
// Agent status
// ============================================

/// Liveness classification of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// No events observed yet
    Pending,
    /// Last event within the active threshold
    Running,
    /// Last event between the active and idle thresholds
    Idle,
    /// Last event older than the idle threshold
    Stale,
    /// Finished, by marker or presumption
    Completed,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 5] = [
        AgentStatus::Pending,
        AgentStatus::Running,
        AgentStatus::Idle,
        AgentStatus::Stale,
        AgentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Idle => "idle",
            AgentStatus::Stale => "stale",
            AgentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentStatus::Pending),
            "running" => Ok(AgentStatus::Running),
            "idle" => Ok(AgentStatus::Idle),
            "stale" => Ok(AgentStatus::Stale),
            "completed" => Ok(AgentStatus::Completed),
            _ => Err(format!("unknown agent status: {}", s)),
        }
    }
}

/// Why an agent is considered completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// A completion marker appeared in the log
    Marker,
    /// The agent's `status.json` says completed
    StatusFile,
    /// Heuristic: long silence after substantial activity. Not sticky.
    Presumed,
}

/// One entry of the recent activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// `tool_use`, `text`, or the raw kind of the line
    pub kind: String,
    /// Tool name for tool uses
    pub tool: Option<String>,
    /// Truncated human readable description
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-agent status as handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub role: String,
    pub wave: u32,
    pub mission: String,
    pub status: AgentStatus,
    pub completion: Option<CompletionSource>,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Seconds since the last event, never negative
    pub age_secs: Option<i64>,
    /// 0-100; an estimate unless completed
    pub progress: u8,
    pub recent_activity: Vec<ActivityEntry>,
    pub tool_usage: BTreeMap<String, u64>,
    /// Up to the configured number of touched paths, sorted
    pub files_touched: Vec<String>,
    pub files_touched_total: usize,
    pub total_events: u64,
    pub malformed_lines: u64,
    /// Most recent parse warnings (`line offset N: reason`)
    pub warnings: Vec<String>,
    /// The log could not be read this pass; data is from earlier passes
    pub degraded: bool,
    pub error: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// Whole-swarm rollup.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmSummary {
    pub swarm_name: String,
    pub generated_at: DateTime<Utc>,
    pub counts: BTreeMap<AgentStatus, usize>,
    pub total_agents: usize,
    /// Share of completed agents, 0-100
    pub overall_progress: u8,
    pub agents: BTreeMap<String, AgentSnapshot>,
}

impl SwarmSummary {
    pub fn from_snapshots(
        swarm_name: impl Into<String>,
        generated_at: DateTime<Utc>,
        snapshots: Vec<AgentSnapshot>,
    ) -> Self {
        let mut counts: BTreeMap<AgentStatus, usize> =
            AgentStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for snapshot in &snapshots {
            *counts.entry(snapshot.status).or_insert(0) += 1;
        }

        let total_agents = snapshots.len();
        let completed = counts[&AgentStatus::Completed];
        let overall_progress = if total_agents > 0 {
            (completed * 100 / total_agents) as u8
        } else {
            0
        };

        Self {
            swarm_name: swarm_name.into(),
            generated_at,
            counts,
            total_agents,
            overall_progress,
            agents: snapshots.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn count(&self, status: AgentStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Snapshots grouped by launch wave, each group ordered by agent id.
    pub fn agents_by_wave(&self) -> BTreeMap<u32, Vec<&AgentSnapshot>> {
        let mut waves: BTreeMap<u32, Vec<&AgentSnapshot>> = BTreeMap::new();
        for snapshot in self.agents.values() {
            waves.entry(snapshot.wave).or_default().push(snapshot);
        }
        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(len: u64, inode: u64) -> Fingerprint {
        Fingerprint {
            len,
            modified_at: None,
            identity: Some(FileIdentity { device: 1, inode }),
        }
    }

    #[test]
    fn test_growth_is_continuation() {
        assert!(fp(200, 7).is_continuation_of(&fp(100, 7), 100));
        assert!(fp(100, 7).is_continuation_of(&fp(100, 7), 100));
    }

    #[test]
    fn test_truncation_is_not_continuation() {
        assert!(!fp(50, 7).is_continuation_of(&fp(100, 7), 100));
        // Shorter than what was already consumed
        assert!(!fp(80, 7).is_continuation_of(&fp(60, 7), 90));
    }

    #[test]
    fn test_replaced_file_is_not_continuation() {
        assert!(!fp(500, 8).is_continuation_of(&fp(100, 7), 100));
    }

    #[test]
    fn test_mtime_going_backwards_is_not_continuation() {
        use chrono::TimeZone;
        let at = |secs: i64| Utc.timestamp_opt(1_750_000_000 + secs, 0).single();
        let before = Fingerprint {
            modified_at: at(10),
            ..fp(100, 7)
        };

        let older = Fingerprint {
            modified_at: at(5),
            ..fp(200, 7)
        };
        assert!(!older.is_continuation_of(&before, 100));

        let same = Fingerprint {
            modified_at: at(10),
            ..fp(100, 7)
        };
        assert!(same.is_continuation_of(&before, 100));

        let newer = Fingerprint {
            modified_at: at(20),
            ..fp(150, 7)
        };
        assert!(newer.is_continuation_of(&before, 100));

        // Unknown mtime on either side falls back to size and identity
        assert!(fp(150, 7).is_continuation_of(&before, 100));
    }

    #[test]
    fn test_missing_identity_falls_back_to_size() {
        let before = Fingerprint {
            len: 10,
            modified_at: None,
            identity: None,
        };
        assert!(fp(20, 3).is_continuation_of(&before, 10));
        assert!(!fp(5, 3).is_continuation_of(&before, 10));
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(EventKind::from_raw("tool_use"), EventKind::ToolUse);
        assert_eq!(EventKind::from_raw("file_write"), EventKind::FileWrite);
        assert_eq!(EventKind::from_raw("status"), EventKind::StatusMarker);
        assert_eq!(EventKind::from_raw("assistant"), EventKind::Message);
        assert_eq!(EventKind::from_raw(""), EventKind::Message);
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in AgentStatus::ALL {
            assert_eq!(status.as_str().parse::<AgentStatus>().unwrap(), status);
        }
        assert!("failed".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_summary_progress() {
        let now = Utc::now();
        let snap = |id: &str, status| AgentSnapshot {
            id: id.to_string(),
            role: "r".into(),
            wave: 1,
            mission: String::new(),
            status,
            completion: None,
            last_event_at: None,
            age_secs: None,
            progress: 0,
            recent_activity: vec![],
            tool_usage: BTreeMap::new(),
            files_touched: vec![],
            files_touched_total: 0,
            total_events: 0,
            malformed_lines: 0,
            warnings: vec![],
            degraded: false,
            error: None,
            log_path: None,
        };
        let summary = SwarmSummary::from_snapshots(
            "swarm",
            now,
            vec![
                snap("a", AgentStatus::Completed),
                snap("b", AgentStatus::Running),
                snap("c", AgentStatus::Pending),
                snap("d", AgentStatus::Completed),
            ],
        );
        assert_eq!(summary.total_agents, 4);
        assert_eq!(summary.overall_progress, 50);
        assert_eq!(summary.count(AgentStatus::Completed), 2);
        assert_eq!(summary.count(AgentStatus::Idle), 0);

        let empty = SwarmSummary::from_snapshots("swarm", now, vec![]);
        assert_eq!(empty.overall_progress, 0);
    }
}
