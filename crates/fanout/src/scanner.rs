// SPDX-License-Identifier: MIT

//! Folder scanner (spec.md §4.A).
//!
//! Enumerates candidate project folders under a scan root and classifies
//! each using its `logs/sessions/`, `handoff/`, and `exit/` subdirectories
//! plus a caller-supplied snapshot of live runtimes. Never caches: every
//! call re-reads the filesystem (spec.md §3 "Lifecycle... computed on
//! demand and not cached across requests").

use crate::error::FanoutError;
use gueridon_core::folder::{is_valid_folder_name, FolderDescriptor, FolderLifecycle};
use gueridon_core::{FolderName, LiveSessionSnapshot, SessionId};
use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Enumerate and classify every candidate folder under `scan_root`.
///
/// `live` is a read-only snapshot (folder name -> session id, turn-in-progress,
/// context percent) handed down by the session registry; the scanner never
/// inspects a runtime directly (spec.md §4.A contract).
pub fn scan(
    scan_root: &Path,
    live: &HashMap<FolderName, LiveSessionSnapshot>,
) -> Result<Vec<FolderDescriptor>, FanoutError> {
    if !scan_root.is_dir() {
        return Err(FanoutError::ScanRootUnreadable(scan_root.to_path_buf()));
    }

    let mut descriptors = Vec::new();
    let entries = std::fs::read_dir(scan_root).map_err(|source| FanoutError::Io {
        path: scan_root.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| FanoutError::Io {
            path: scan_root.to_path_buf(),
            source,
        })?;
        let file_type = entry.file_type().map_err(|source| FanoutError::Io {
            path: entry.path(),
            source,
        })?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_valid_folder_name(&name) {
            continue;
        }
        descriptors.push(describe_folder(scan_root, FolderName::new(name), live));
    }

    descriptors.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
    Ok(descriptors)
}

fn describe_folder(
    scan_root: &Path,
    name: FolderName,
    live: &HashMap<FolderName, LiveSessionSnapshot>,
) -> FolderDescriptor {
    let path = scan_root.join(name.as_str());
    let (latest_session_id, last_activity_ms) = latest_session(&path);
    let handoff_note = latest_handoff_note(&path);
    let live_snapshot = live.get(&name);

    let exited = latest_session_id
        .as_ref()
        .is_some_and(|id| exit_marker_exists(&path, id));

    let lifecycle = if exited {
        FolderLifecycle::Closed
    } else if let Some(snapshot) = live_snapshot {
        if snapshot.turn_in_progress {
            FolderLifecycle::Active
        } else {
            FolderLifecycle::Paused
        }
    } else {
        FolderLifecycle::Fresh
    };

    FolderDescriptor {
        name,
        path,
        lifecycle,
        latest_session_id,
        last_activity_ms,
        handoff_note,
    }
}

/// Find the most recently modified `logs/sessions/*.jsonl` file, returning
/// its session id (the file stem) and modification time in Unix millis.
fn latest_session(folder_path: &Path) -> (Option<SessionId>, Option<i64>) {
    let sessions_dir = folder_path.join("logs").join("sessions");
    let Ok(entries) = std::fs::read_dir(&sessions_dir) else {
        return (None, None);
    };

    let mut latest: Option<(SessionId, i64)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        if latest.as_ref().is_none_or(|(_, t)| millis > *t) {
            latest = Some((SessionId::new(stem), millis));
        }
    }
    match latest {
        Some((id, millis)) => (Some(id), Some(millis)),
        None => (None, None),
    }
}

/// Read the most-recent-by-name handoff marker's free-text body, if any.
fn latest_handoff_note(folder_path: &Path) -> Option<String> {
    let handoff_dir = folder_path.join("handoff");
    let entries = std::fs::read_dir(&handoff_dir).ok()?;
    let mut names: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    names.sort();
    let latest = names.pop()?;
    std::fs::read_to_string(latest).ok()
}

/// Zero-byte marker at `<folder>/exit/<session-id>`: presence means the
/// session was deliberately closed and must not be resumed.
fn exit_marker_exists(folder_path: &Path, session_id: &SessionId) -> bool {
    folder_path
        .join("exit")
        .join(session_id.as_str())
        .is_file()
}

/// The session id a new Session Runtime for `folder_path` should resume,
/// or `None` to start fresh: the most recently modified session log,
/// unless its exit marker blocks resume (spec.md §3 "closed... must not
/// be resumed", §8 "Exit -> attach: ... a new session id").
pub fn resumable_session(folder_path: &Path) -> Option<SessionId> {
    let (id, _) = latest_session(folder_path);
    let id = id?;
    if exit_marker_exists(folder_path, &id) {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_folder(root: &Path, name: &str) -> std::path::PathBuf {
        let path = root.join(name);
        fs::create_dir_all(path.join("logs").join("sessions")).unwrap();
        path
    }

    #[test]
    fn fresh_folder_with_no_sessions() {
        let root = TempDir::new().unwrap();
        make_folder(root.path(), "alpha");
        let live = HashMap::new();
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "alpha");
        assert_eq!(descriptors[0].lifecycle, FolderLifecycle::Fresh);
        assert!(descriptors[0].latest_session_id.is_none());
    }

    #[test]
    fn rejects_invalid_folder_names() {
        let root = TempDir::new().unwrap();
        make_folder(root.path(), "Invalid_Name");
        make_folder(root.path(), "valid-name");
        let live = HashMap::new();
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "valid-name");
    }

    #[test]
    fn paused_when_live_but_not_turn_in_progress() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "beta");
        fs::write(
            path.join("logs").join("sessions").join("s1.jsonl"),
            "{}\n",
        )
        .unwrap();
        let mut live = HashMap::new();
        live.insert(
            FolderName::new("beta"),
            LiveSessionSnapshot {
                session_id: SessionId::new("s1"),
                turn_in_progress: false,
                context_percent: 5,
            },
        );
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors[0].lifecycle, FolderLifecycle::Paused);
        assert_eq!(descriptors[0].latest_session_id, Some(SessionId::new("s1")));
    }

    #[test]
    fn active_when_turn_in_progress() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "gamma");
        fs::write(
            path.join("logs").join("sessions").join("s1.jsonl"),
            "{}\n",
        )
        .unwrap();
        let mut live = HashMap::new();
        live.insert(
            FolderName::new("gamma"),
            LiveSessionSnapshot {
                session_id: SessionId::new("s1"),
                turn_in_progress: true,
                context_percent: 5,
            },
        );
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors[0].lifecycle, FolderLifecycle::Active);
    }

    #[test]
    fn closed_takes_priority_over_live_snapshot() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "delta");
        fs::write(
            path.join("logs").join("sessions").join("s1.jsonl"),
            "{}\n",
        )
        .unwrap();
        fs::create_dir_all(path.join("exit")).unwrap();
        fs::write(path.join("exit").join("s1"), "").unwrap();

        let mut live = HashMap::new();
        live.insert(
            FolderName::new("delta"),
            LiveSessionSnapshot {
                session_id: SessionId::new("s1"),
                turn_in_progress: true,
                context_percent: 5,
            },
        );
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors[0].lifecycle, FolderLifecycle::Closed);
    }

    #[test]
    fn reads_most_recent_handoff_note_by_name() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "epsilon");
        fs::create_dir_all(path.join("handoff")).unwrap();
        fs::write(path.join("handoff").join("1-first.md"), "first").unwrap();
        fs::write(path.join("handoff").join("2-second.md"), "second").unwrap();
        let live = HashMap::new();
        let descriptors = scan(root.path(), &live).unwrap();
        assert_eq!(descriptors[0].handoff_note.as_deref(), Some("second"));
    }

    #[test]
    fn resumable_session_none_without_logs() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "zeta");
        assert!(resumable_session(&path).is_none());
    }

    #[test]
    fn resumable_session_blocked_by_exit_marker() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "eta");
        fs::write(path.join("logs").join("sessions").join("s1.jsonl"), "{}\n").unwrap();
        fs::create_dir_all(path.join("exit")).unwrap();
        fs::write(path.join("exit").join("s1"), "").unwrap();
        assert!(resumable_session(&path).is_none());
    }

    #[test]
    fn resumable_session_returns_latest_when_not_exited() {
        let root = TempDir::new().unwrap();
        let path = make_folder(root.path(), "theta");
        fs::write(path.join("logs").join("sessions").join("s1.jsonl"), "{}\n").unwrap();
        assert_eq!(resumable_session(&path), Some(SessionId::new("s1")));
    }

    #[test]
    fn missing_scan_root_errors() {
        let live = HashMap::new();
        let err = scan(Path::new("/does/not/exist"), &live).unwrap_err();
        assert!(matches!(err, FanoutError::ScanRootUnreadable(_)));
    }
}
