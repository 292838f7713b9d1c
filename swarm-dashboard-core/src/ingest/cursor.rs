//! Per-file read cursors
//!
//! The store remembers, for every tracked log file, how many bytes have been
//! consumed and the fingerprint the file had at that point. It performs no
//! I/O: callers stat the file and hand the fingerprint in.

use crate::types::{Fingerprint, TrackedFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where to resume reading a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub start_offset: u64,
    /// Fingerprint to commit with once the read succeeds
    pub fingerprint: Fingerprint,
    /// The stored position was discarded because the file was rotated or truncated
    pub rotated: bool,
}

/// In-memory cursor bookkeeping for all tracked files.
#[derive(Debug, Default)]
pub struct CursorStore {
    files: HashMap<PathBuf, TrackedFile>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the resume offset for `path` given its current fingerprint.
    ///
    /// A file seen for the first time starts at zero. If the fingerprint is
    /// not a continuation of the stored one, the stored offset is reset to
    /// zero before it is returned.
    pub fn advance(&mut self, path: &Path, current: Fingerprint) -> Cursor {
        match self.files.get_mut(path) {
            Some(tracked) => {
                if current.is_continuation_of(&tracked.fingerprint, tracked.offset) {
                    Cursor {
                        start_offset: tracked.offset,
                        fingerprint: current,
                        rotated: false,
                    }
                } else {
                    tracing::info!(
                        path = %path.display(),
                        previous_offset = tracked.offset,
                        previous_len = tracked.fingerprint.len,
                        current_len = current.len,
                        "Log rotation or truncation detected, rewinding to start"
                    );
                    tracked.offset = 0;
                    tracked.fingerprint = current.clone();
                    Cursor {
                        start_offset: 0,
                        fingerprint: current,
                        rotated: true,
                    }
                }
            }
            None => {
                self.files.insert(
                    path.to_path_buf(),
                    TrackedFile {
                        path: path.to_path_buf(),
                        fingerprint: current.clone(),
                        offset: 0,
                    },
                );
                Cursor {
                    start_offset: 0,
                    fingerprint: current,
                    rotated: false,
                }
            }
        }
    }

    /// Record a successful read up to `new_offset`.
    pub fn commit(&mut self, path: &Path, new_offset: u64, fingerprint: Fingerprint) {
        let tracked = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| TrackedFile {
                path: path.to_path_buf(),
                fingerprint: fingerprint.clone(),
                offset: 0,
            });

        if new_offset < tracked.offset {
            // A stale read finished after a newer one; keep the furthest position.
            tracing::debug!(
                path = %path.display(),
                committed = tracked.offset,
                attempted = new_offset,
                "Ignoring cursor commit behind current position"
            );
            return;
        }

        tracked.offset = new_offset;
        tracked.fingerprint = fingerprint;
    }

    /// Committed offset for `path`, zero if untracked.
    pub fn position(&self, path: &Path) -> u64 {
        self.files.get(path).map(|t| t.offset).unwrap_or(0)
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Rewind one file so the next read starts from zero.
    pub fn reset(&mut self, path: &Path) {
        if let Some(tracked) = self.files.get_mut(path) {
            tracked.offset = 0;
        }
    }

    pub fn reset_all(&mut self) {
        for tracked in self.files.values_mut() {
            tracked.offset = 0;
        }
    }

    /// Stop tracking a file entirely.
    pub fn forget(&mut self, path: &Path) -> Option<TrackedFile> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
