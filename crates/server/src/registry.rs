// SPDX-License-Identifier: MIT

//! The session registry (spec.md §9 "a single *SessionRegistry* owning all
//! runtimes with a lifecycle tied to the process; create/lookup is
//! atomic"). Grounded on the teacher's process-wide `sessions` map
//! (`oj_storage::MaterializedState` guarded behind one `parking_lot::Mutex`
//! in `ListenCtx`), generalised from one job table to one runtime per
//! folder.

use gueridon_core::{resolve_folder_path, BrokerConfig, CoreError, FolderName, LiveSessionSnapshot};
use gueridon_runtime::{spawn_runtime, RuntimeCommand};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Owns every live Session Runtime, keyed by folder name. The only
/// structure shared across HTTP handlers (spec.md §5 "Shared resources").
pub struct SessionRegistry {
    config: BrokerConfig,
    runtimes: Mutex<HashMap<FolderName, mpsc::UnboundedSender<RuntimeCommand>>>,
}

impl SessionRegistry {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Look up a runtime for `folder` without creating one.
    pub fn lookup(&self, folder: &FolderName) -> Option<mpsc::UnboundedSender<RuntimeCommand>> {
        let mut guard = self.runtimes.lock();
        let Some(sender) = guard.get(folder) else {
            return None;
        };
        if sender.is_closed() {
            guard.remove(folder);
            return None;
        }
        Some(sender.clone())
    }

    /// Atomic lookup-or-create for `folder` (spec.md §5 "lookup-and-create
    /// is atomic per folder", §3 "created on first `session` call... or on
    /// the first `prompt` for an unbound folder").
    pub fn get_or_create(
        &self,
        folder: &FolderName,
    ) -> Result<mpsc::UnboundedSender<RuntimeCommand>, CoreError> {
        let folder_path = resolve_folder_path(&self.config.scan_root, folder.as_str())?;
        let mut guard = self.runtimes.lock();
        if let Some(sender) = guard.get(folder) {
            if !sender.is_closed() {
                return Ok(sender.clone());
            }
        }
        let resume = gueridon_fanout::resumable_session(&folder_path);
        let sender = spawn_runtime(
            folder.clone(),
            folder_path,
            self.config.agent_command.clone(),
            resume,
        );
        guard.insert(folder.clone(), sender.clone());
        Ok(sender)
    }

    /// Drop senders whose runtime task has already exited.
    pub fn prune_dead(&self) {
        self.runtimes.lock().retain(|_, sender| !sender.is_closed());
    }

    /// Every folder currently holding a runtime (live or grace-idle).
    pub fn folders(&self) -> Vec<FolderName> {
        self.runtimes.lock().keys().cloned().collect()
    }

    /// Query every live runtime for its session snapshot, for the folder
    /// scanner's classification (spec.md §4.A contract). Read-only: HTTP
    /// handlers never touch runtime-internal state directly (spec.md §5).
    pub async fn live_snapshot(&self) -> HashMap<FolderName, LiveSessionSnapshot> {
        let senders: Vec<(FolderName, mpsc::UnboundedSender<RuntimeCommand>)> = {
            let guard = self.runtimes.lock();
            guard
                .iter()
                .map(|(f, s)| (f.clone(), s.clone()))
                .collect()
        };

        let mut out = HashMap::new();
        for (folder, sender) in senders {
            let (tx, rx) = oneshot::channel();
            if sender.send(RuntimeCommand::Snapshot { reply: tx }).is_err() {
                continue;
            }
            if let Ok(snapshot) = rx.await {
                out.insert(folder, snapshot);
            }
        }
        out
    }

    /// Query every live runtime's session id + child PID, for the
    /// orphan-reaper records file (spec.md §4.H, §6).
    pub async fn live_pids(&self) -> Vec<(FolderName, gueridon_core::SessionId, i32)> {
        let senders: Vec<(FolderName, mpsc::UnboundedSender<RuntimeCommand>)> = {
            let guard = self.runtimes.lock();
            guard
                .iter()
                .map(|(f, s)| (f.clone(), s.clone()))
                .collect()
        };

        let mut out = Vec::new();
        for (folder, sender) in senders {
            let (tx, rx) = oneshot::channel();
            if sender.send(RuntimeCommand::Pid { reply: tx }).is_err() {
                continue;
            }
            if let Ok(Some((session_id, pid))) = rx.await {
                out.push((folder, session_id, pid));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(scan_root: PathBuf) -> BrokerConfig {
        BrokerConfig {
            scan_root,
            config_dir: PathBuf::from("/tmp/gueridon-test-config"),
            port: 0,
            agent_command: "true".to_string(),
        }
    }

    #[test]
    fn lookup_is_none_before_creation() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(config(dir.path().to_path_buf()));
        assert!(registry.lookup(&FolderName::new("alpha")).is_none());
    }

    #[test]
    fn get_or_create_rejects_invalid_folder_name() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(config(dir.path().to_path_buf()));
        assert!(registry.get_or_create(&FolderName::new("Bad Name")).is_err());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("alpha")).unwrap();
        let registry = SessionRegistry::new(config(dir.path().to_path_buf()));
        let folder = FolderName::new("alpha");
        let a = registry.get_or_create(&folder).unwrap();
        let b = registry.get_or_create(&folder).unwrap();
        assert!(a.same_channel(&b));
    }
}
