// SPDX-License-Identifier: MIT

//! Child process spawn and kill-escalation mechanics (spec.md §4.E "Child
//! management", "Kill escalation").
//!
//! Grounded on the watch/liveness shape of the teacher's
//! `adapters/src/agent/watcher.rs` (`watch_agent`, `check_liveness`), with
//! tmux-pane capture replaced by a directly piped child process and
//! `nix`-based signal delivery in place of tmux's own `kill-session`.

use crate::error::RuntimeError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// Entrypoint-advertising variables stripped from the child's environment
/// so it does not believe it is being hosted by a different entrypoint
/// (spec.md §4.E "Child management").
const STRIPPED_ENV_VARS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE_ENTRYPOINT"];

const STDERR_RING_CAPACITY: usize = 20;

/// A spawned agent child plus the pipes the runtime drives it through.
pub struct SpawnedChild {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: BufReader<ChildStdout>,
    pub stderr_ring: Arc<Mutex<VecDeque<String>>>,
}

/// Spawn `command` in `cwd`, wiring stdin/stdout for the runtime's event
/// loop and draining stderr into a ring buffer of the last
/// [`STDERR_RING_CAPACITY`] lines for diagnostics.
///
/// `resume_session_id` is passed as `--resume <id>` iff the folder has a
/// prior usable session and no exit marker (spec.md §4.E).
pub fn spawn(
    command: &str,
    cwd: &Path,
    resume_session_id: Option<&str>,
) -> Result<SpawnedChild, RuntimeError> {
    let mut cmd = tokio::process::Command::new(command);
    cmd.current_dir(cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    for var in STRIPPED_ENV_VARS {
        cmd.env_remove(var);
    }
    if let Some(session_id) = resume_session_id {
        cmd.arg("--resume").arg(session_id);
    }

    let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
        folder: cwd.display().to_string(),
        source,
    })?;

    let missing_pipe = |what: &str| RuntimeError::Spawn {
        folder: cwd.display().to_string(),
        source: std::io::Error::other(format!("child has no piped {what}")),
    };
    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = BufReader::new(
        child
            .stdout
            .take()
            .ok_or_else(|| missing_pipe("stdout"))?,
    );
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let stderr_ring = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_RING_CAPACITY)));
    let ring_handle = stderr_ring.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let mut ring = ring_handle.lock().await;
                    if ring.len() == STDERR_RING_CAPACITY {
                        ring.pop_front();
                    }
                    ring.push_back(line);
                }
                Ok(None) | Err(_) => break,
            }
        }
    });

    Ok(SpawnedChild {
        child,
        stdin,
        stdout,
        stderr_ring,
    })
}

/// Write one JSON-line prompt envelope to the child's stdin.
pub async fn write_line(stdin: &mut ChildStdin, body: &str) -> Result<(), RuntimeError> {
    stdin
        .write_all(body.as_bytes())
        .await
        .map_err(RuntimeError::StdinWrite)?;
    stdin
        .write_all(b"\n")
        .await
        .map_err(RuntimeError::StdinWrite)?;
    stdin.flush().await.map_err(RuntimeError::StdinWrite)
}

/// Send the polite signal, wait up to `grace` for exit, and escalate to the
/// forceful signal if the child is still alive (spec.md §4.E "Kill
/// escalation").
pub async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
        }
        let _ = child.wait().await;
    }
}
