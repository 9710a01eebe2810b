// SPDX-License-Identifier: MIT

//! Folder descriptor types (spec.md §3, "Folder descriptor") and the shared
//! name/path validation policy used by both the scanner and the transport
//! surface (spec.md §4.A "Contract", §6 "Path parameters... validated
//! against the scan root").

use crate::error::CoreError;
use crate::id::{FolderName, SessionId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_FOLDER_NAME_LEN: usize = 64;

/// Restrictive folder name policy (spec.md §4.A): lowercase alphanumerics
/// and hyphens, not leading with a hyphen, length <= 64.
pub fn is_valid_folder_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FOLDER_NAME_LEN {
        return false;
    }
    if name.starts_with('-') {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Resolve `name` to a path under `scan_root`, rejecting anything that
/// fails the name policy or that would not lexically resolve within the
/// root (no `..` escapes, no absolute overrides).
///
/// This is a lexical check, not a symlink-aware canonicalization: the
/// scanner only ever hands out names it already enumerated from real
/// directory entries, so a lexical join is sufficient here and avoids a
/// syscall on every request.
pub fn resolve_folder_path(scan_root: &Path, name: &str) -> Result<PathBuf, CoreError> {
    if !is_valid_folder_name(name) {
        return Err(CoreError::InvalidFolderName(name.to_string()));
    }
    let candidate = scan_root.join(name);
    if candidate.parent() != Some(scan_root) {
        return Err(CoreError::PathOutsideScanRoot(name.to_string()));
    }
    Ok(candidate)
}

/// Lifecycle state of a project folder as computed by the folder scanner.
///
/// Classification priority: `Closed` > `Paused` > `Active` > `Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderLifecycle {
    /// No session has ever been started for this folder.
    Fresh,
    /// A Session Runtime exists for this folder but is idle between turns.
    Paused,
    /// A Session Runtime exists and its turn-in-progress flag is set.
    Active,
    /// The latest known session was deliberately exited and must not resume.
    Closed,
}

/// A candidate project folder discovered under the scan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub name: FolderName,
    pub path: PathBuf,
    pub lifecycle: FolderLifecycle,
    pub latest_session_id: Option<SessionId>,
    /// Unix millis of last known activity, if any.
    pub last_activity_ms: Option<i64>,
    pub handoff_note: Option<String>,
}

/// Per-folder snapshot of a live Session Runtime, as seen by the scanner.
///
/// The scanner never inspects a runtime directly; the registry hands it this
/// read-only view (spec.md §5 "run independently... through read-only
/// snapshots").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSessionSnapshot {
    pub session_id: SessionId,
    pub turn_in_progress: bool,
    pub context_percent: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_serializes_snake_case() {
        let json = serde_json::to_string(&FolderLifecycle::Active).unwrap();
        assert_eq!(json, "\"active\"");
    }

    #[test]
    fn name_policy_accepts_lowercase_hyphenated() {
        assert!(is_valid_folder_name("my-project-42"));
    }

    #[test]
    fn name_policy_rejects_leading_hyphen_uppercase_and_overlong() {
        assert!(!is_valid_folder_name("-oops"));
        assert!(!is_valid_folder_name("MyProject"));
        assert!(!is_valid_folder_name(&"a".repeat(65)));
        assert!(!is_valid_folder_name(""));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let root = Path::new("/scan/root");
        assert!(resolve_folder_path(root, "../etc").is_err());
        assert!(resolve_folder_path(root, "ok").is_ok());
    }
}
