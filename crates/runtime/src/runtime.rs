// SPDX-License-Identifier: MIT

//! Session runtime (spec.md §4.E): the per-folder actor owning a child
//! process, its state builder/conflator pipeline, the pending-prompt queue,
//! and the fan-out ring.
//!
//! Grounded on the teacher's `watch_agent`/`watch_loop`
//! (`adapters/src/agent/watcher.rs`): a single `tokio::select!` loop
//! serialises every input (commands, child stdout lines, timer ticks), with
//! tmux-pane capture replaced by directly piped stdio and the notify-based
//! file watcher replaced by a flush/deadline tick, since this runtime's
//! timers (init/grace/flush/kill) all tolerate being checked on a shared
//! cadence rather than firing at exact instants.

use crate::child;
use crate::error::RuntimeError;
use gueridon_core::{Delta, FolderName, LiveSessionSnapshot, SessionId, SessionState, SessionStatus};
use gueridon_decoder::{decode_event, Conflator, DecodedEvent, Mode, StateBuilder};
use gueridon_fanout::{FanoutRing, Frame, FrameKind};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot, Mutex};

const INIT_DEADLINE: Duration = Duration::from_secs(30);
const GRACE_PERIOD: Duration = Duration::from_secs(60);
const KILL_GRACE: Duration = Duration::from_secs(2);
const FLUSH_INTERVAL: Duration = Duration::from_millis(50);
const MAX_PROMPT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Spawning,
    Ready,
    Turn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextBand {
    Normal,
    Amber,
    Red,
}

fn band_for(context_percent: u8) -> ContextBand {
    let remaining = 100u8.saturating_sub(context_percent);
    if remaining <= 10 {
        ContextBand::Red
    } else if remaining <= 20 {
        ContextBand::Amber
    } else {
        ContextBand::Normal
    }
}

/// The body of a prompt: either free text or a pre-built content array, as
/// accepted by `POST /prompt/:folder` (spec.md §6).
#[derive(Debug, Clone)]
pub enum PromptContent {
    Text(String),
    Blocks(Value),
}

impl PromptContent {
    fn approx_len(&self) -> usize {
        match self {
            PromptContent::Text(t) => t.len(),
            PromptContent::Blocks(v) => v.to_string().len(),
        }
    }
}

pub struct PromptAck {
    pub queued: bool,
    pub position: usize,
}

pub struct AttachReply {
    pub session_id: SessionId,
    /// Serialized `state` frame body, ready for wire delivery.
    pub snapshot: Frame,
    /// Bracketed replay frames, if the client's last-event-id is still in
    /// the ring (spec.md §4.F).
    pub replay: Option<Vec<Frame>>,
}

struct PendingPrompt {
    content: PromptContent,
    reply: Option<oneshot::Sender<Result<PromptAck, RuntimeError>>>,
}

pub enum RuntimeCommand {
    Attach {
        last_event_id: Option<u64>,
        reply: oneshot::Sender<AttachReply>,
    },
    Subscribe {
        sender: mpsc::UnboundedSender<Frame>,
        reply: oneshot::Sender<()>,
    },
    Detach,
    Prompt {
        content: PromptContent,
        reply: oneshot::Sender<Result<PromptAck, RuntimeError>>,
    },
    Abort {
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Exit {
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Snapshot {
        reply: oneshot::Sender<LiveSessionSnapshot>,
    },
    /// Current session id + child PID, if a child is alive (spec.md §4.H,
    /// orphan-reaper records file).
    Pid {
        reply: oneshot::Sender<Option<(SessionId, i32)>>,
    },
}

/// Folds `scan_root`/`folder` into the session log path consumed for
/// replay and local-command recovery (spec.md §6, filesystem layout).
fn session_log_path(folder_path: &PathBuf, session_id: &SessionId) -> PathBuf {
    folder_path
        .join("logs")
        .join("sessions")
        .join(format!("{}.jsonl", session_id.as_str()))
}

fn exit_marker_path(folder_path: &PathBuf, session_id: &SessionId) -> PathBuf {
    folder_path.join("exit").join(session_id.as_str())
}

/// Replay a session log (one envelope per line, optionally
/// `{source:"cc",event:<event>}`-wrapped) into a fresh [`SessionState`].
fn replay_log(path: &PathBuf, folder: &FolderName, session_id: &SessionId) -> SessionState {
    let state = SessionState::new(session_id.clone(), folder.clone());
    let mut builder = StateBuilder::new(state, Mode::Replay);
    let Ok(contents) = std::fs::read_to_string(path) else {
        return builder.into_state();
    };
    for line in contents.lines() {
        let Ok(raw) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let event_json = raw.get("event").cloned().unwrap_or(raw);
        let event = decode_event(&event_json);
        builder.apply(&event);
    }
    builder.into_state()
}

fn find_latest_local_command_stdout(path: &PathBuf) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    for line in contents.lines().rev() {
        let Ok(raw) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let event_json = raw.get("event").cloned().unwrap_or(raw);
        if let DecodedEvent::UserText { text } = decode_event(&event_json) {
            if text.contains("<local-command-stdout>") {
                return Some(text);
            }
        }
    }
    None
}

/// The per-folder actor. Owns everything mutable about one session; every
/// field here is touched only from inside [`SessionRuntime::run`], matching
/// the single-logical-queue scheduling model (spec.md §5).
pub struct SessionRuntime {
    folder: FolderName,
    folder_path: PathBuf,
    agent_command: String,

    phase: Phase,
    session_id: SessionId,
    builder: StateBuilder,
    conflator: Conflator,
    ring: FanoutRing,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_lines: Option<tokio::io::Lines<BufReader<ChildStdout>>>,
    stderr_ring: Option<Arc<Mutex<VecDeque<String>>>>,
    pending_kill_deadline: Option<Instant>,

    subscribers: HashMap<u64, mpsc::UnboundedSender<Frame>>,
    next_subscriber_id: u64,
    grace_deadline: Option<Instant>,
    init_deadline: Option<Instant>,

    prompt_queue: VecDeque<PendingPrompt>,
    messages_len_at_turn_start: usize,

    context_band: ContextBand,
    band_note_pending: Option<String>,

    commands: mpsc::UnboundedReceiver<RuntimeCommand>,
}

pub fn spawn_runtime(
    folder: FolderName,
    folder_path: PathBuf,
    agent_command: String,
    resume_session_id: Option<SessionId>,
) -> mpsc::UnboundedSender<RuntimeCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    let (session_id, state) = match &resume_session_id {
        Some(id) => {
            let log_path = session_log_path(&folder_path, id);
            (id.clone(), replay_log(&log_path, &folder, id))
        }
        None => {
            let placeholder = SessionId::new(format!("pending-{}", folder.as_str()));
            (placeholder.clone(), SessionState::new(placeholder, folder.clone()))
        }
    };

    let runtime = SessionRuntime {
        folder,
        folder_path,
        agent_command,
        phase: Phase::Idle,
        session_id,
        builder: StateBuilder::new(state, Mode::Live),
        conflator: Conflator::new(),
        ring: FanoutRing::default(),
        child: None,
        stdin: None,
        stdout_lines: None,
        stderr_ring: None,
        pending_kill_deadline: None,
        subscribers: HashMap::new(),
        next_subscriber_id: 0,
        grace_deadline: Some(Instant::now() + GRACE_PERIOD),
        init_deadline: None,
        prompt_queue: VecDeque::new(),
        messages_len_at_turn_start: 0,
        context_band: ContextBand::Normal,
        band_note_pending: None,
        commands: rx,
    };

    tokio::spawn(runtime.run());
    tx
}

impl SessionRuntime {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            let stdout_ready = self.stdout_lines.is_some();
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                line = async { self.stdout_lines.as_mut().unwrap().next_line().await }, if stdout_ready => {
                    self.handle_child_line(line).await;
                }
                _ = ticker.tick() => {
                    self.handle_tick().await;
                    if self.should_destroy() {
                        break;
                    }
                }
            }
        }
        self.shutdown_child().await;
    }

    fn should_destroy(&self) -> bool {
        matches!(self.grace_deadline, Some(deadline) if Instant::now() >= deadline)
            && self.subscribers.is_empty()
    }

    async fn handle_command(&mut self, cmd: RuntimeCommand) {
        match cmd {
            RuntimeCommand::Attach { last_event_id, reply } => {
                let snapshot = self.build_state_frame();
                let replay = last_event_id.and_then(|id| self.ring.replay_since(id));
                let _ = reply.send(AttachReply {
                    session_id: self.session_id.clone(),
                    snapshot,
                    replay,
                });
                self.grace_deadline = None;
            }
            RuntimeCommand::Subscribe { sender, reply } => {
                self.next_subscriber_id += 1;
                self.subscribers.insert(self.next_subscriber_id, sender);
                self.grace_deadline = None;
                let _ = reply.send(());
            }
            RuntimeCommand::Detach => {
                if self.subscribers.is_empty() {
                    self.grace_deadline = Some(Instant::now() + GRACE_PERIOD);
                }
            }
            RuntimeCommand::Prompt { content, reply } => {
                self.handle_prompt(content, reply).await;
            }
            RuntimeCommand::Abort { reply } => {
                self.handle_abort(reply).await;
            }
            RuntimeCommand::Exit { reply } => {
                self.handle_exit(reply).await;
            }
            RuntimeCommand::Snapshot { reply } => {
                let _ = reply.send(LiveSessionSnapshot {
                    session_id: self.session_id.clone(),
                    turn_in_progress: self.phase == Phase::Turn,
                    context_percent: self.builder.state().context_percent,
                });
            }
            RuntimeCommand::Pid { reply } => {
                let pid = self
                    .child
                    .as_ref()
                    .and_then(|c| c.id())
                    .map(|id| (self.session_id.clone(), id as i32));
                let _ = reply.send(pid);
            }
        }
    }

    async fn handle_prompt(
        &mut self,
        content: PromptContent,
        reply: oneshot::Sender<Result<PromptAck, RuntimeError>>,
    ) {
        if content.approx_len() > MAX_PROMPT_BYTES {
            let _ = reply.send(Err(RuntimeError::PromptTooLarge));
            return;
        }

        if self.phase == Phase::Idle {
            if let Err(e) = self.spawn_child().await {
                let _ = reply.send(Err(e));
                return;
            }
        }

        if self.phase == Phase::Ready {
            self.deliver_prompt(content).await;
            let _ = reply.send(Ok(PromptAck {
                queued: false,
                position: 0,
            }));
        } else {
            self.prompt_queue.push_back(PendingPrompt {
                content,
                reply: None,
            });
            let position = self.prompt_queue.len();
            let _ = reply.send(Ok(PromptAck {
                queued: true,
                position,
            }));
        }
    }

    async fn deliver_prompt(&mut self, content: PromptContent) {
        let note = self.band_note_pending.take();
        let content_value = match (&content, &note) {
            (PromptContent::Text(t), None) => Value::String(t.clone()),
            (PromptContent::Blocks(v), None) => v.clone(),
            (PromptContent::Text(t), Some(note)) => json!([
                {"type": "text", "text": note},
                {"type": "text", "text": t},
            ]),
            (PromptContent::Blocks(v), Some(note)) => {
                let mut items = vec![json!({"type": "text", "text": note})];
                if let Value::Array(existing) = v {
                    items.extend(existing.clone());
                } else {
                    items.push(v.clone());
                }
                Value::Array(items)
            }
        };
        let envelope = json!({
            "type": "user",
            "message": {"role": "user", "content": content_value},
        });

        self.messages_len_at_turn_start = self.builder.state().messages.len();
        self.phase = Phase::Turn;

        if let Some(stdin) = self.stdin.as_mut() {
            if let Err(e) = child::write_line(stdin, &envelope.to_string()).await {
                tracing::warn!(folder = %self.folder, error = %e, "failed to write prompt to child stdin");
            }
        }

        if self.subscribers.is_empty() {
            // No client attached: close stdin so the child drains and
            // exits rather than hanging (spec.md §4.E "Prompt queue").
            self.stdin = None;
        }
    }

    async fn handle_abort(&mut self, reply: oneshot::Sender<Result<(), RuntimeError>>) {
        if let Some(child) = self.child.as_ref() {
            if let Some(pid) = child.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            }
        }
        self.pending_kill_deadline = Some(Instant::now() + KILL_GRACE);
        let _ = reply.send(Ok(()));
    }

    async fn handle_exit(&mut self, reply: oneshot::Sender<Result<(), RuntimeError>>) {
        if let Err(e) = std::fs::create_dir_all(self.folder_path.join("exit")) {
            tracing::warn!(folder = %self.folder, error = %e, "failed to create exit dir");
        }
        let marker = exit_marker_path(&self.folder_path, &self.session_id);
        if let Err(e) = std::fs::write(&marker, b"") {
            tracing::warn!(folder = %self.folder, error = %e, "failed to write exit marker");
        }
        self.shutdown_child().await;
        self.subscribers.clear();
        self.phase = Phase::Idle;

        // The exit-marked session must never resume (spec.md §8 "Exit ->
        // attach: ... a new session id"); start this runtime over with a
        // fresh placeholder so the next attach sees an empty session.
        let placeholder = SessionId::new(format!("pending-{}", self.folder.as_str()));
        self.session_id = placeholder.clone();
        self.builder = StateBuilder::new(
            SessionState::new(placeholder, self.folder.clone()),
            Mode::Live,
        );
        self.ring = FanoutRing::default();
        self.prompt_queue.clear();
        self.context_band = ContextBand::Normal;
        self.band_note_pending = None;

        let _ = reply.send(Ok(()));
    }

    async fn spawn_child(&mut self) -> Result<(), RuntimeError> {
        let resumable = !self.session_id.as_str().starts_with("pending-")
            && !exit_marker_path(&self.folder_path, &self.session_id).is_file();
        let resume_arg = resumable.then_some(self.session_id.as_str());

        let spawned = child::spawn(&self.agent_command, &self.folder_path, resume_arg)?;
        self.child = Some(spawned.child);
        self.stdin = Some(spawned.stdin);
        self.stdout_lines = Some(spawned.stdout.lines());
        self.stderr_ring = Some(spawned.stderr_ring);

        self.phase = Phase::Spawning;
        self.init_deadline = Some(Instant::now() + INIT_DEADLINE);
        Ok(())
    }

    async fn handle_child_line(&mut self, line: Result<Option<String>, std::io::Error>) {
        match line {
            Ok(Some(raw)) => self.process_raw_line(&raw).await,
            Ok(None) | Err(_) => self.handle_child_exit().await,
        }
    }

    async fn process_raw_line(&mut self, raw: &str) {
        let Ok(json) = serde_json::from_str::<Value>(raw) else {
            tracing::debug!(folder = %self.folder, "ignoring non-JSON child stdout line");
            return;
        };
        let event = decode_event(&json);

        if let DecodedEvent::StreamBlockDelta { index, delta } = event {
            self.conflator.ingest(index, delta);
            return;
        }

        self.flush_conflator();
        self.apply_event(event, Some(&json)).await;
    }

    fn flush_conflator(&mut self) {
        if self.conflator.is_empty() {
            return;
        }
        let flushed = self.conflator.flush();
        for (index, delta) in flushed {
            let outcome = self
                .builder
                .apply(&DecodedEvent::StreamBlockDelta { index, delta });
            self.broadcast_deltas(outcome.deltas);
        }
    }

    async fn apply_event(&mut self, event: DecodedEvent, raw_for_log: Option<&Value>) {
        let is_turn_result = matches!(event, DecodedEvent::TurnResult(_));
        let is_system_init = matches!(event, DecodedEvent::SystemInit(_));

        if is_system_init {
            self.init_deadline = None;
            if self.builder.state().session_id.as_str().starts_with("pending-") {
                if let DecodedEvent::SystemInit(ref init) = event {
                    if let Some(id) = &init.session_id {
                        let mut state = self.builder.state().clone();
                        state.session_id = SessionId::new(id.clone());
                        self.session_id = state.session_id.clone();
                        self.builder = StateBuilder::new(state, Mode::Live);
                    }
                }
            }
        }

        let outcome = self.builder.apply(&event);
        self.broadcast_deltas(outcome.deltas);

        if let Some(cwd) = outcome.cwd_changed {
            tracing::debug!(folder = %self.folder, %cwd, "child reported cwd");
        }

        if is_system_init {
            self.phase = Phase::Ready;
            self.maybe_dequeue_prompt().await;
        }

        if is_turn_result {
            self.phase = Phase::Ready;
            let new_band = band_for(self.builder.state().context_percent);
            if outcome.compaction_detected {
                self.context_band = ContextBand::Normal;
            } else if new_band != ContextBand::Normal && new_band != self.context_band {
                self.context_band = new_band;
                self.band_note_pending = Some(match new_band {
                    ContextBand::Amber => {
                        "[gueridon:system] Context window is getting full (80%+ used)."
                            .to_string()
                    }
                    ContextBand::Red => {
                        "[gueridon:system] Context window is nearly full (90%+ used)."
                            .to_string()
                    }
                    ContextBand::Normal => unreachable!(),
                });
            }

            if self.builder.state().messages.len() == self.messages_len_at_turn_start {
                let session_id = self.session_id.clone();
                let log_path = session_log_path(&self.folder_path, &session_id);
                if let Some(text) = find_latest_local_command_stdout(&log_path) {
                    let outcome = self.builder.apply(&DecodedEvent::UserText { text });
                    self.broadcast_deltas(outcome.deltas);
                }
            }

            self.broadcast_state_snapshot();
            self.maybe_dequeue_prompt().await;
        }

        let _ = raw_for_log;
    }

    async fn maybe_dequeue_prompt(&mut self) {
        if self.phase != Phase::Ready {
            return;
        }
        let Some(pending) = self.prompt_queue.pop_front() else {
            return;
        };
        self.deliver_prompt(pending.content).await;
        if let Some(reply) = pending.reply {
            let _ = reply.send(Ok(PromptAck {
                queued: false,
                position: 0,
            }));
        }
    }

    async fn handle_child_exit(&mut self) {
        self.stdout_lines = None;
        self.stdin = None;
        self.stderr_ring = None;

        let killed_by_signal = if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) => {
                    use std::os::unix::process::ExitStatusExt;
                    status.signal().is_some()
                }
                Err(_) => false,
            }
        } else {
            false
        };

        if self.phase == Phase::Turn {
            let subtype = if killed_by_signal { "aborted" } else { "error" };
            let synthetic = json!({
                "type": "result",
                "subtype": subtype,
            });
            let event = decode_event(&synthetic);
            let outcome = self.builder.apply(&event);
            self.broadcast_deltas(outcome.deltas);
            self.broadcast_state_snapshot();
        }
        self.phase = Phase::Idle;
    }

    async fn handle_tick(&mut self) {
        self.flush_conflator();

        if let Some(deadline) = self.init_deadline {
            if Instant::now() >= deadline {
                tracing::warn!(folder = %self.folder, "child failed to emit system-init in time");
                self.init_deadline = None;
                if let Some(mut child) = self.child.take() {
                    child::terminate(&mut child, KILL_GRACE).await;
                }
                self.stdin = None;
                self.stdout_lines = None;
                self.stderr_ring = None;
                self.phase = Phase::Idle;
                let mut state = self.builder.state().clone();
                state.status = SessionStatus::Error;
                state.latest_error = Some("agent initialisation timed out".to_string());
                self.builder = StateBuilder::new(state, Mode::Live);
                self.broadcast_state_snapshot();
            }
        }

        if let Some(deadline) = self.pending_kill_deadline {
            if Instant::now() >= deadline {
                self.pending_kill_deadline = None;
                if let Some(child) = self.child.as_mut() {
                    if let Some(pid) = child.id() {
                        let pid = nix::unistd::Pid::from_raw(pid as i32);
                        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
                    }
                }
            }
        }
    }

    async fn shutdown_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            child::terminate(child, KILL_GRACE).await;
        }
    }

    fn build_state_frame(&mut self) -> Frame {
        let body = serde_json::to_string(self.builder.state())
            .unwrap_or_else(|_| "{}".to_string());
        self.ring.push(self.folder.clone(), FrameKind::State, body)
    }

    fn broadcast_state_snapshot(&mut self) {
        let frame = self.build_state_frame();
        self.fan_out(&frame);
    }

    fn broadcast_deltas(&mut self, deltas: Vec<Delta>) {
        for delta in deltas {
            let mut body = serde_json::to_value(&delta).unwrap_or(Value::Null);
            if let Value::Object(ref mut map) = body {
                map.insert(
                    "folder".to_string(),
                    Value::String(self.folder.as_str().to_string()),
                );
            }
            let frame = self
                .ring
                .push(self.folder.clone(), FrameKind::Delta, body.to_string());
            self.fan_out(&frame);
        }
    }

    fn fan_out(&mut self, frame: &Frame) {
        let mut dead = Vec::new();
        for (id, sender) in &self.subscribers {
            if sender.send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_thresholds() {
        assert_eq!(band_for(0), ContextBand::Normal);
        assert_eq!(band_for(79), ContextBand::Normal);
        assert_eq!(band_for(80), ContextBand::Amber);
        assert_eq!(band_for(90), ContextBand::Red);
        assert_eq!(band_for(100), ContextBand::Red);
    }
}
