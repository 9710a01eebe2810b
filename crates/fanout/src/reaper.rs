// SPDX-License-Identifier: MIT

//! Orphan reaper (spec.md §4.H) and the debounced records-file writer that
//! feeds it.
//!
//! Grounded on the teacher's startup orphan-breadcrumb scan in
//! `daemon/src/lifecycle.rs` (`reconcile_state`, stale-threshold scan): probe
//! each persisted PID, signal the live ones, then discard the breadcrumb.
//! The teacher uses a 7-day staleness window for its own breadcrumbs; this
//! reaper uses the 24 h window spec.md specifies for session PIDs.

use gueridon_core::{FolderName, SessionId};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::FanoutError;

const ORPHAN_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanRecord {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub folder: FolderName,
    pub pid: i32,
    #[serde(rename = "spawnedAt")]
    pub spawned_at_ms: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Read the records file, tolerating a missing file (treated as empty).
pub fn load_records(path: &Path) -> Result<Vec<OrphanRecord>, FanoutError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_json::from_str(&contents).map_err(|_| FanoutError::RecordsCorrupt(path.to_path_buf()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(FanoutError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Overwrite the records file atomically (write to a sibling temp file,
/// then rename), matching the teacher's write-then-rename durability
/// ordering for its own marker files.
pub fn write_records(path: &Path, records: &[OrphanRecord]) -> Result<(), FanoutError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| FanoutError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string());
    std::fs::write(&tmp_path, body).map_err(|source| FanoutError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| FanoutError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Best-effort delete; a missing file is not an error.
pub fn delete_records(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %path.display(), "failed to delete orphan records file");
        }
    }
}

fn probe_alive(pid: i32) -> bool {
    // A signal-0 kill checks liveness without actually sending a signal.
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Run the reaper: read `path`, terminate any record younger than 24h whose
/// PID is still alive, then delete the file regardless of outcome
/// (spec.md §4.H steps 1-3).
///
/// Errors are logged and skipped per record (spec.md §7 "Orphan reap
/// failure... does not block startup"); the function itself never fails.
pub fn reap(path: &Path) -> usize {
    let records = match load_records(path) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read orphan records, skipping reap");
            delete_records(path);
            return 0;
        }
    };

    let now = now_ms();
    let mut signalled = 0;
    for record in &records {
        let age = now - record.spawned_at_ms;
        if age < 0 || age > ORPHAN_MAX_AGE_MS {
            continue;
        }
        if !probe_alive(record.pid) {
            continue;
        }
        match kill(Pid::from_raw(record.pid), Signal::SIGTERM) {
            Ok(()) => {
                tracing::info!(
                    pid = record.pid,
                    folder = %record.folder,
                    session_id = %record.session_id,
                    "reaped orphaned child"
                );
                signalled += 1;
            }
            Err(e) => {
                tracing::warn!(pid = record.pid, error = %e, "failed to signal orphaned child");
            }
        }
    }

    delete_records(path);
    signalled
}

/// Rate-limits records-file rewrites so a burst of runtime spawns/exits
/// does not hammer the filesystem (spec.md §4.H "re-written, debounced,
/// whenever the set of live runtimes... changes").
pub struct Debouncer {
    min_interval: Duration,
    last_write: Option<Instant>,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_write: None,
        }
    }

    /// Returns `true` if enough time has elapsed since the last write to
    /// perform another one now, and records that a write just happened.
    pub fn should_write(&mut self) -> bool {
        let now = Instant::now();
        let due = match self.last_write {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if due {
            self.last_write = Some(now);
        }
        due
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(pid: i32, age_ms: i64) -> OrphanRecord {
        OrphanRecord {
            session_id: SessionId::new("s1"),
            folder: FolderName::new("alpha"),
            pid,
            spawned_at_ms: now_ms() - age_ms,
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        assert_eq!(load_records(&path).unwrap(), Vec::new());
    }

    #[test]
    fn write_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let records = vec![record(std::process::id() as i32, 1_000)];
        write_records(&path, &records).unwrap();
        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(FanoutError::RecordsCorrupt(_))
        ));
    }

    #[test]
    fn reap_deletes_file_even_on_empty_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        write_records(&path, &[]).unwrap();
        assert_eq!(reap(&path), 0);
        assert!(!path.exists());
    }

    #[test]
    fn reap_skips_records_older_than_24h() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        // Our own pid is always alive, but this record is stale.
        let stale = record(std::process::id() as i32, 25 * 60 * 60 * 1000);
        write_records(&path, &[stale]).unwrap();
        // Not signalled (would need to actually kill our own test process
        // to observe that), but must not panic and must still clean up.
        reap(&path);
        assert!(!path.exists());
    }

    #[test]
    fn debouncer_allows_first_write_then_rate_limits() {
        let mut debouncer = Debouncer::new(Duration::from_secs(3600));
        assert!(debouncer.should_write());
        assert!(!debouncer.should_write());
    }
}
