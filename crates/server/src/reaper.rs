// SPDX-License-Identifier: MIT

//! Wires the registry's live child PIDs to `gueridon_fanout`'s orphan
//! records file (spec.md §4.H): on start, reap whatever the previous
//! process left behind; while running, keep the records file in sync with
//! the debounced cadence `gueridon_fanout::Debouncer` provides; on clean
//! shutdown, delete it.

use crate::registry::SessionRegistry;
use gueridon_core::{FolderName, SessionId};
use gueridon_fanout::{delete_records, Debouncer, OrphanRecord};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reap orphans left by a prior process (spec.md §4.H steps 1-3), logging
/// and returning the count signalled. Must run before the listener starts
/// accepting connections.
pub fn reap_on_startup(path: &std::path::Path) -> usize {
    let reaped = gueridon_fanout::reap(path);
    if reaped > 0 {
        tracing::info!(count = reaped, "reaped orphaned children from prior run");
    }
    reaped
}

/// Background task keeping `<config_dir>/sessions.json` in sync with the
/// registry's live children, debounced against filesystem churn (spec.md
/// §4.H "re-written, debounced, whenever the set of live runtimes with
/// children changes").
pub async fn run(registry: Arc<SessionRegistry>, sessions_path: PathBuf) {
    let mut known: HashMap<FolderName, (SessionId, i32, i64)> = HashMap::new();
    let mut debouncer = Debouncer::default();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        ticker.tick().await;
        let live = registry.live_pids().await;

        let now = now_ms();
        let mut next = HashMap::with_capacity(live.len());
        let mut changed = live.len() != known.len();
        for (folder, session_id, pid) in live {
            let spawned_at = known
                .get(&folder)
                .filter(|(_, known_pid, _)| *known_pid == pid)
                .map(|(_, _, t)| *t)
                .unwrap_or(now);
            if known.get(&folder).map(|(_, p, _)| *p) != Some(pid) {
                changed = true;
            }
            next.insert(folder, (session_id, pid, spawned_at));
        }
        known = next;

        if changed && debouncer.should_write() {
            let records: Vec<OrphanRecord> = known
                .iter()
                .map(|(folder, (session_id, pid, spawned_at))| OrphanRecord {
                    session_id: session_id.clone(),
                    folder: folder.clone(),
                    pid: *pid,
                    spawned_at_ms: *spawned_at,
                })
                .collect();
            if let Err(e) = gueridon_fanout::write_records(&sessions_path, &records) {
                tracing::warn!(error = %e, "failed to write orphan records file");
            }
        }
    }
}

/// Delete the records file on clean shutdown so the next start has
/// nothing to reap (spec.md §4.H "A clean shutdown also deletes it").
pub fn clear_on_shutdown(sessions_path: &std::path::Path) {
    delete_records(sessions_path);
}
