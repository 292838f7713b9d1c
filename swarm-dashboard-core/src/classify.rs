//! Agent state folding and liveness classification
//!
//! [`AgentState`] accumulates everything learned from an agent's log.
//! [`classify`] turns that state plus the current time into an
//! [`AgentStatus`]:
//!
//! | Condition | Status |
//! |-----------|--------|
//! | completion marker or status file seen (sticky) | `Completed` |
//! | no event ever observed | `Pending` |
//! | heuristic enabled, enough events, `age >= presumed_done` | `Completed` (presumed) |
//! | `age < active` | `Running` |
//! | `active <= age < idle` | `Idle` |
//! | `age >= idle` | `Stale` |
//!
//! Age is clamped at zero, so events stamped in the future count as fresh.

use crate::activity;
use crate::config::ThresholdsConfig;
use crate::types::{ActivityEntry, AgentStatus, CompletionSource, EventRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Knobs used while folding events into state.
#[derive(Debug, Clone, Copy)]
pub struct FoldSettings<'a> {
    pub max_recent_events: usize,
    pub max_content_length: usize,
    pub completion_phrases: &'a [String],
}

/// Aggregate of an agent's observed activity.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// Only `Marker` and `StatusFile` are ever stored; presumption is computed
    completion: Option<CompletionSource>,
    last_seen: Option<DateTime<Utc>>,
    recent: VecDeque<ActivityEntry>,
    tool_usage: BTreeMap<String, u64>,
    files_touched: BTreeSet<String>,
    total_events: u64,
    malformed_lines: u64,
    warnings: VecDeque<String>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold decoded events into the state.
    pub fn fold(&mut self, records: &[EventRecord], settings: &FoldSettings<'_>) {
        for record in records {
            self.total_events += 1;

            if let Some(ts) = record.timestamp {
                self.observe_activity(ts);
            }

            for tool in activity::tool_uses(record) {
                *self.tool_usage.entry(tool.name.to_string()).or_insert(0) += 1;
            }
            self.files_touched.extend(activity::files_touched(record));

            for entry in activity::describe(record, settings.max_content_length) {
                if self.recent.len() >= settings.max_recent_events {
                    self.recent.pop_front();
                }
                self.recent.push_back(entry);
            }

            if self.completion.is_none()
                && activity::is_completion_marker(record, settings.completion_phrases)
            {
                tracing::debug!(offset = record.offset, kind = %record.raw_kind, "Completion marker observed");
                self.completion = Some(CompletionSource::Marker);
            }
        }
    }

    /// Move last-seen forward to `ts`; never backwards.
    pub fn observe_activity(&mut self, ts: DateTime<Utc>) {
        if self.last_seen.map_or(true, |seen| ts > seen) {
            self.last_seen = Some(ts);
        }
    }

    /// Count malformed lines and keep the latest of their warnings.
    pub fn record_malformed(
        &mut self,
        count: u64,
        warnings: &[String],
        settings: &FoldSettings<'_>,
    ) {
        self.malformed_lines += count;
        for warning in warnings {
            if self.warnings.len() >= settings.max_recent_events {
                self.warnings.pop_front();
            }
            self.warnings.push_back(warning.clone());
        }
    }

    /// Record an out-of-band completion (e.g. a status file).
    pub fn mark_completed(&mut self, source: CompletionSource) {
        if source != CompletionSource::Presumed && self.completion.is_none() {
            self.completion = Some(source);
        }
    }

    /// Forget what was derived from the current log file, malformed counts included.
    ///
    /// Used when the file is rotated or replaced and will be re-read from the
    /// start. Completion and last-seen survive.
    pub fn reset_file_aggregates(&mut self) {
        self.recent.clear();
        self.tool_usage.clear();
        self.files_touched.clear();
        self.total_events = 0;
        self.malformed_lines = 0;
        self.warnings.clear();
    }

    pub fn completion(&self) -> Option<CompletionSource> {
        self.completion
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn recent_activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.recent.iter()
    }

    pub fn tool_usage(&self) -> &BTreeMap<String, u64> {
        &self.tool_usage
    }

    pub fn files_touched(&self) -> &BTreeSet<String> {
        &self.files_touched
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        self.warnings.iter()
    }
}

/// Outcome of one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: AgentStatus,
    pub completion: Option<CompletionSource>,
    /// `now - last_seen`, clamped at zero
    pub age: Option<Duration>,
}

impl Classification {
    /// Rough progress: 100 when completed, else one point per five events up to 90.
    pub fn progress(&self, total_events: u64) -> u8 {
        match self.status {
            AgentStatus::Completed => 100,
            AgentStatus::Pending => 0,
            _ => (total_events / 5).min(90) as u8,
        }
    }
}

/// Classify `state` as of `now`.
pub fn classify(
    state: &AgentState,
    now: DateTime<Utc>,
    thresholds: &ThresholdsConfig,
) -> Classification {
    let age = state
        .last_seen
        .map(|seen| now.signed_duration_since(seen).max(Duration::zero()));

    if let Some(source) = state.completion {
        return Classification {
            status: AgentStatus::Completed,
            completion: Some(source),
            age,
        };
    }

    let Some(age) = age else {
        return Classification {
            status: AgentStatus::Pending,
            completion: None,
            age: None,
        };
    };

    if thresholds.presumed_done_enabled
        && state.total_events >= thresholds.presumed_done_min_events
        && age >= thresholds.presumed_done()
    {
        return Classification {
            status: AgentStatus::Completed,
            completion: Some(CompletionSource::Presumed),
            age: Some(age),
        };
    }

    let status = if age < thresholds.active() {
        AgentStatus::Running
    } else if age < thresholds.idle() {
        AgentStatus::Idle
    } else {
        AgentStatus::Stale
    };

    Classification {
        status,
        completion: None,
        age: Some(age),
    }
}
