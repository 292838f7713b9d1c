//! The swarm monitor service
//!
//! [`SwarmMonitor`] owns the cursor store, the result cache and one
//! [`AgentState`] per registered agent. Every status query runs one
//! read-parse-classify pass:
//!
//! 1. locate the agent's log and stat it (blocking pool, with timeout)
//! 2. ask the cursor store where to resume
//! 3. serve the range from the cache, or read it (blocking pool, with timeout)
//! 4. fold the records into the agent's state, then commit the cursor
//! 5. classify against the current time
//!
//! Passes for the same agent are serialized by a per-agent async mutex.
//! The cursor store and cache sit behind short synchronous locks that are
//! never held across an await, so a cancelled pass commits nothing.

use crate::classify::{classify, AgentState, FoldSettings};
use crate::config::{AgentSpec, Config, SwarmConfig};
use crate::error::{Error, Result};
use crate::ingest::cache::{CacheKey, CacheStats, ResultCache};
use crate::ingest::cursor::CursorStore;
use crate::ingest::discovery::{self, STATUS_FILE};
use crate::ingest::reader::{read_new, ReadBatch};
use crate::types::{AgentSnapshot, AgentStatus, CompletionSource, Fingerprint, SwarmSummary};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// One registered agent.
#[derive(Debug)]
struct AgentSlot {
    spec: AgentSpec,
    pass: tokio::sync::Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    state: AgentState,
    /// Log file the aggregates were built from
    log_path: Option<PathBuf>,
    /// Offset up to which `log_path` has been folded into `state`
    folded_offset: u64,
    /// `progress` from the agent's status file, if it reports one
    reported_progress: Option<u8>,
    last_error: Option<String>,
}

impl SlotState {
    fn restart_file(&mut self) {
        self.state.reset_file_aggregates();
        self.folded_offset = 0;
    }
}

/// What a blocking look at the agent's directory found.
#[derive(Debug)]
struct AgentFiles {
    log: Option<(PathBuf, Fingerprint)>,
    status: StatusFile,
}

/// The parts of an agent's `status.json` that feed its snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
struct StatusFile {
    completed: bool,
    /// Clamped to 0..=100
    progress: Option<u8>,
}

/// Tracks every agent of a swarm and answers status queries.
///
/// Construct once at start-up and share it behind an `Arc`.
#[derive(Debug)]
pub struct SwarmMonitor {
    config: Config,
    agents: RwLock<BTreeMap<String, Arc<AgentSlot>>>,
    cursors: Mutex<CursorStore>,
    cache: Mutex<ResultCache>,
}

impl SwarmMonitor {
    /// Create a monitor and register every agent listed in `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let agents = config.agents.clone();
        let monitor = Self {
            cursors: Mutex::new(CursorStore::new()),
            cache: Mutex::new(ResultCache::new(config.cache.capacity)),
            agents: RwLock::new(BTreeMap::new()),
            config,
        };
        for spec in agents {
            monitor.register_agent(spec)?;
        }

        tracing::info!(
            swarm = %monitor.config.swarm.name,
            agents = monitor.agent_count(),
            cache_capacity = monitor.config.cache.capacity,
            "Swarm monitor ready"
        );
        Ok(monitor)
    }

    /// Load configuration from the default path and create a monitor.
    pub fn from_config() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start tracking an agent.
    ///
    /// Fails if the id is already registered, or if the agent would share a
    /// log file with another agent.
    pub fn register_agent(&self, spec: AgentSpec) -> Result<()> {
        if spec.id.is_empty() {
            return Err(Error::Config("agent id cannot be empty".to_string()));
        }

        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(&spec.id) {
            return Err(Error::Config(format!(
                "agent {} is already registered",
                spec.id
            )));
        }

        for other in agents.values() {
            if let (Some(mine), Some(theirs)) = (&spec.log_path, &other.spec.log_path) {
                if mine == theirs {
                    return Err(Error::DuplicateLogPath {
                        path: mine.clone(),
                        owner: other.spec.id.clone(),
                    });
                }
            }
            if let (Some(mine), Some(theirs)) = (&spec.task_id, &other.spec.task_id) {
                if mine == theirs {
                    return Err(Error::DuplicateLogPath {
                        path: self.config.swarm.task_dir.join(format!("{}.output", mine)),
                        owner: other.spec.id.clone(),
                    });
                }
            }
        }

        tracing::debug!(agent = %spec.id, role = %spec.role, wave = spec.wave, "Registered agent");
        agents.insert(
            spec.id.clone(),
            Arc::new(AgentSlot {
                spec,
                pass: tokio::sync::Mutex::new(SlotState::default()),
            }),
        );
        Ok(())
    }

    /// Stop tracking an agent and drop its cursor and cached batches.
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        let slot = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;

        let inner = slot.pass.lock().await;
        if let Some(path) = &inner.log_path {
            self.lock_cursors().forget(path);
            self.lock_cache().invalidate(path);
        }
        tracing::debug!(agent = %agent_id, "Unregistered agent");
        Ok(())
    }

    /// Make the registered agents match `specs`.
    ///
    /// Ids missing from `specs` are unregistered and new ids are registered.
    /// An agent whose spec changed is registered afresh. Registration errors
    /// do not stop the sync; the first one is returned once it is done.
    pub async fn sync_agents(&self, specs: &[AgentSpec]) -> Result<()> {
        let wanted: BTreeMap<&str, &AgentSpec> =
            specs.iter().map(|spec| (spec.id.as_str(), spec)).collect();

        let outdated: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, slot)| {
                wanted
                    .get(id.as_str())
                    .map_or(true, |spec| **spec != slot.spec)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &outdated {
            // Ignore agents unregistered concurrently
            let _ = self.unregister_agent(id).await;
        }

        let mut added = 0usize;
        let mut first_error = None;
        for spec in wanted.into_values() {
            if self
                .agents
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&spec.id)
            {
                continue;
            }
            match self.register_agent(spec.clone()) {
                Ok(()) => added += 1,
                Err(e) => {
                    tracing::warn!(agent = %spec.id, error = %e, "Could not register agent");
                    first_error.get_or_insert(e);
                }
            }
        }

        if added > 0 || !outdated.is_empty() {
            tracing::info!(
                added,
                removed = outdated.len(),
                agents = self.agent_count(),
                "Agent set updated"
            );
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Registered agent ids, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Current status of one agent.
    pub async fn agent_status(&self, agent_id: &str) -> Result<AgentSnapshot> {
        self.agent_status_at(agent_id, Utc::now()).await
    }

    /// Status of one agent, classified as of `now`.
    ///
    /// Only an unknown agent is an error. Any failure to read the log
    /// degrades the snapshot instead.
    pub async fn agent_status_at(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentSnapshot> {
        let slot = self.slot(agent_id)?;
        let mut inner = slot.pass.lock().await;

        match self.refresh(&slot.spec, &mut inner).await {
            Ok(()) => inner.last_error = None,
            Err(e) => {
                tracing::warn!(agent = %agent_id, error = %e, "Agent log unavailable, reporting retained state");
                inner.last_error = Some(e.to_string());
            }
        }

        Ok(self.snapshot(&slot.spec, &inner, now))
    }

    /// Status of every registered agent.
    pub async fn swarm_status(&self) -> SwarmSummary {
        self.swarm_status_at(Utc::now()).await
    }

    /// Status of every registered agent, classified as of `now`.
    pub async fn swarm_status_at(&self, now: DateTime<Utc>) -> SwarmSummary {
        let slots: Vec<Arc<AgentSlot>> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut snapshots = Vec::with_capacity(slots.len());
        for slot in slots {
            match self.agent_status_at(&slot.spec.id, now).await {
                Ok(snapshot) => snapshots.push(snapshot),
                // Unregistered while the pass was queued
                Err(Error::UnknownAgent(_)) => {}
                Err(e) => tracing::warn!(agent = %slot.spec.id, error = %e, "Skipping agent"),
            }
        }

        SwarmSummary::from_snapshots(self.config.swarm.name.clone(), now, snapshots)
    }

    /// Rescan an agent's log from the start on the next query.
    ///
    /// Completion and last-seen are kept; everything derived from the file
    /// is rebuilt. Cached batches stay valid and are reused.
    pub async fn reset(&self, agent_id: &str) -> Result<()> {
        let slot = self.slot(agent_id)?;
        let mut inner = slot.pass.lock().await;
        if let Some(path) = &inner.log_path {
            self.lock_cursors().reset(path);
        }
        inner.restart_file();
        tracing::info!(agent = %agent_id, "Agent log will be rescanned");
        Ok(())
    }

    /// Rescan every agent.
    pub async fn reset_all(&self) {
        for id in self.agent_ids() {
            // Ignore agents unregistered concurrently
            let _ = self.reset(&id).await;
        }
    }

    /// Committed read offset for a log file.
    pub fn cursor_position(&self, path: &Path) -> u64 {
        self.lock_cursors().position(path)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn slot(&self, agent_id: &str) -> Result<Arc<AgentSlot>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))
    }

    fn lock_cursors(&self) -> MutexGuard<'_, CursorStore> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run blocking file work on the blocking pool, bounded by the I/O timeout.
    async fn run_blocking<T, F>(&self, path: &Path, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let millis = self.config.limits.io_timeout_ms;
        let task = tokio::task::spawn_blocking(work);

        match tokio::time::timeout(std::time::Duration::from_millis(millis), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::FileAccess {
                path: path.to_path_buf(),
                message: format!("read task failed: {}", join_error),
            }),
            Err(_) => Err(Error::Timeout {
                path: path.to_path_buf(),
                millis,
            }),
        }
    }

    /// Bring `inner` up to date with the agent's log.
    async fn refresh(&self, spec: &AgentSpec, inner: &mut SlotState) -> Result<()> {
        let agent_dir = discovery::agent_dir(&self.config.swarm, spec);
        let files = {
            let swarm = self.config.swarm.clone();
            let spec = spec.clone();
            self.run_blocking(&agent_dir, move || locate_agent_files(&swarm, &spec))
                .await?
        };

        if files.status.completed {
            inner.state.mark_completed(CompletionSource::StatusFile);
        }
        inner.reported_progress = files.status.progress;

        let Some((path, fingerprint)) = files.log else {
            return match &inner.log_path {
                Some(previous) => Err(Error::FileAccess {
                    path: previous.clone(),
                    message: "log file no longer exists".to_string(),
                }),
                None => Ok(()),
            };
        };

        if inner.log_path.as_ref() != Some(&path) {
            if let Some(previous) = inner.log_path.take() {
                tracing::info!(
                    agent = %spec.id,
                    previous = %previous.display(),
                    current = %path.display(),
                    "Agent log file changed"
                );
                self.lock_cache().invalidate(&previous);
            }
            inner.restart_file();
            inner.log_path = Some(path.clone());
        }

        let mtime = fingerprint.modified_at;
        let identity = fingerprint.identity;
        let end = fingerprint.len;
        let cursor = self.lock_cursors().advance(&path, fingerprint);
        let mut start = cursor.start_offset;

        if cursor.rotated {
            self.lock_cache().invalidate(&path);
            inner.restart_file();
        } else if start != inner.folded_offset {
            // Cursor and aggregates disagree; rebuild both from the start
            tracing::debug!(
                agent = %spec.id,
                cursor = start,
                folded = inner.folded_offset,
                "Rebuilding agent state from start of log"
            );
            self.lock_cursors().reset(&path);
            inner.restart_file();
            start = 0;
        }

        if end <= start {
            return Ok(());
        }

        let key = CacheKey {
            path: path.clone(),
            identity,
            start,
            end,
        };
        let cached = self.lock_cache().get(&key);
        let batch = match cached {
            Some(batch) => {
                tracing::trace!(agent = %spec.id, start, end, "Cache hit");
                batch
            }
            None => {
                let read_path = path.clone();
                let batch: ReadBatch = self
                    .run_blocking(&path, move || read_new(&read_path, start))
                    .await?;
                let batch = Arc::new(batch);
                self.lock_cache().put(key, Arc::clone(&batch));
                batch
            }
        };

        let settings = FoldSettings {
            max_recent_events: self.config.limits.max_recent_events,
            max_content_length: self.config.limits.max_content_length,
            completion_phrases: &self.config.markers.completion_phrases,
        };
        inner.state.fold(&batch.records, &settings);
        inner.state.record_malformed(batch.malformed, &batch.warnings, &settings);
        if batch.records.iter().any(|r| r.timestamp.is_none()) {
            if let Some(mtime) = mtime {
                inner.state.observe_activity(mtime);
            }
        }

        self.lock_cursors()
            .commit(&path, batch.new_offset, cursor.fingerprint);
        inner.folded_offset = batch.new_offset;

        tracing::debug!(
            agent = %spec.id,
            start,
            new_offset = batch.new_offset,
            records = batch.records.len(),
            malformed = batch.malformed,
            "Folded new log records"
        );
        Ok(())
    }

    fn snapshot(&self, spec: &AgentSpec, inner: &SlotState, now: DateTime<Utc>) -> AgentSnapshot {
        let state = &inner.state;
        let classification = classify(state, now, &self.config.thresholds);

        AgentSnapshot {
            id: spec.id.clone(),
            role: spec.role.clone(),
            wave: spec.wave,
            mission: spec.mission.clone(),
            status: classification.status,
            completion: classification.completion,
            last_event_at: state.last_seen(),
            age_secs: classification.age.map(|age| age.num_seconds()),
            progress: match (classification.status, inner.reported_progress) {
                (AgentStatus::Completed, _) | (_, None) => {
                    classification.progress(state.total_events())
                }
                (_, Some(reported)) => reported,
            },
            recent_activity: state.recent_activity().cloned().collect(),
            tool_usage: state.tool_usage().clone(),
            files_touched: state
                .files_touched()
                .iter()
                .take(self.config.limits.max_files_listed)
                .cloned()
                .collect(),
            files_touched_total: state.files_touched().len(),
            total_events: state.total_events(),
            malformed_lines: state.malformed_lines(),
            warnings: state.warnings().cloned().collect(),
            degraded: inner.last_error.is_some(),
            error: inner.last_error.clone(),
            log_path: inner.log_path.clone(),
        }
    }
}

/// Locate and stat the agent's log, and read its status file.
fn locate_agent_files(swarm: &SwarmConfig, spec: &AgentSpec) -> Result<AgentFiles> {
    let status = read_status_file(&discovery::agent_dir(swarm, spec).join(STATUS_FILE));

    let log = match discovery::find_agent_log(swarm, spec)? {
        Some(path) => match Fingerprint::of_path(&path) {
            Ok(fingerprint) => Some((path, fingerprint)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::file_access(&path, &e)),
        },
        None => None,
    };

    Ok(AgentFiles { log, status })
}

/// Missing or unparseable status files read as empty.
fn read_status_file(path: &Path) -> StatusFile {
    let Ok(content) = std::fs::read_to_string(path) else {
        return StatusFile::default();
    };
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => StatusFile {
            completed: value
                .get("status")
                .and_then(|s| s.as_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("completed")),
            progress: value
                .get("progress")
                .and_then(|p| p.as_f64())
                .map(|p| p.clamp(0.0, 100.0) as u8),
        },
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Ignoring unreadable status file");
            StatusFile::default()
        }
    }
}
