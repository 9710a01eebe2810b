// SPDX-License-Identifier: MIT

//! State builder (spec.md §4.C): folds decoded events into [`SessionState`]
//! and emits the deltas that describe each change.
//!
//! This is the hardest subsystem in the broker. Two things make it so:
//! the turn/inner-API-call accumulator lifecycle (message-start resets
//! streaming buffers, but message *commit* is driven by assistant-complete
//! dedup, and the two events can arrive in either order relative to
//! block-stop), and the dual live/replay mode (replay must reconstruct
//! byte-identical state without ever emitting a delta or firing a
//! side-effect callback).

use crate::event::{
    AssistantComplete, BlockKind, ContentBlock, DecodedEvent, DecodedToolResult, StreamDelta,
    SystemInit, TurnResult, TurnSubtype,
};
use crate::tool_input::display_input;
use gueridon_core::{
    ActivityKind, AssistantMessage, ContentItem, Delta, Message, MessageId, SessionState,
    SessionStatus, ToolCall, ToolCallId, ToolCallStatus,
};
use std::collections::HashMap;

/// Context window default and compaction thresholds (spec.md §9, Open
/// Question: "magic constants in the source; the spec preserves them
/// verbatim but an implementer should expose them as tunables").
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;
pub const COMPACTION_MIN_INPUT_TOKENS: u64 = 20_000;
pub const COMPACTION_DROP_FRACTION: f64 = 0.15;

/// Tool name filtered out of live tool-call lists and surfaced via a
/// separate callback instead (spec.md §4.C).
pub const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    /// Folds a historical log without emitting deltas or side callbacks
    /// (spec.md §4.C "Replay mode").
    Replay,
}

/// Side effects the runtime must react to outside of ordinary state
/// mutation. Always empty in [`Mode::Replay`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub deltas: Vec<Delta>,
    /// A tool call for the ask-user-question tool, filtered from the
    /// message's visible tool-calls list and surfaced here instead
    /// (live mode only).
    pub ask_user: Option<ToolCall>,
    pub compaction_detected: bool,
    pub cwd_changed: Option<String>,
}

impl ApplyOutcome {
    fn delta(d: Delta) -> Self {
        Self {
            deltas: vec![d],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BlockMeta {
    kind: Option<BlockKind>,
    id: Option<String>,
    name: Option<String>,
}

/// Folds a raw decoded event stream into [`SessionState`].
pub struct StateBuilder {
    state: SessionState,
    mode: Mode,

    text_buffers: HashMap<u32, String>,
    thinking_buffers: HashMap<u32, String>,
    input_buffers: HashMap<u32, String>,
    block_meta: HashMap<u32, BlockMeta>,

    /// The assistant message currently accumulating in this turn, not yet
    /// committed to `state.messages`.
    pending_message: Option<AssistantMessage>,
    /// Message id of the last assistant-complete processed in this turn,
    /// for dedup/inner-API-call-boundary detection.
    last_seen_message_id: Option<MessageId>,
    /// Concatenation of completed thinking blocks for the message
    /// currently accumulating, blank-line separated.
    pending_thinking: Option<String>,
    /// Ephemeral id minted at stream-message-start for the Activity delta,
    /// since the real message id is not known until assistant-complete.
    current_stream_id: Option<MessageId>,

    last_turn_total_input: Option<u64>,
}

impl StateBuilder {
    pub fn new(state: SessionState, mode: Mode) -> Self {
        Self {
            state,
            mode,
            text_buffers: HashMap::new(),
            thinking_buffers: HashMap::new(),
            input_buffers: HashMap::new(),
            block_meta: HashMap::new(),
            pending_message: None,
            last_seen_message_id: None,
            pending_thinking: None,
            current_stream_id: None,
            last_turn_total_input: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    fn emit(&self, delta: Delta) -> ApplyOutcome {
        if self.is_live() {
            ApplyOutcome::delta(delta)
        } else {
            ApplyOutcome::default()
        }
    }

    /// Fold one decoded event into state, returning any side effects.
    pub fn apply(&mut self, event: &DecodedEvent) -> ApplyOutcome {
        match event {
            DecodedEvent::SystemInit(init) => self.apply_system_init(init),
            DecodedEvent::StreamMessageStart => self.apply_message_start(),
            DecodedEvent::StreamBlockStart {
                index,
                kind,
                id,
                name,
            } => {
                self.block_meta.insert(
                    *index,
                    BlockMeta {
                        kind: Some(*kind),
                        id: id.clone(),
                        name: name.clone(),
                    },
                );
                ApplyOutcome::default()
            }
            DecodedEvent::StreamBlockDelta { index, delta } => self.apply_block_delta(*index, delta),
            DecodedEvent::StreamBlockStop { index } => self.apply_block_stop(*index),
            DecodedEvent::StreamMessageDelta => ApplyOutcome::default(),
            DecodedEvent::StreamMessageStop => self.apply_message_stop(),
            DecodedEvent::AssistantComplete(ac) => self.apply_assistant_complete(ac),
            DecodedEvent::ApiErrorAssistant { message } => self.apply_api_error(message),
            DecodedEvent::UserText { text } => self.apply_user_text(text),
            DecodedEvent::ToolResults(results) => self.apply_tool_results(results),
            DecodedEvent::TurnResult(result) => self.apply_turn_result(result),
            DecodedEvent::Unknown => ApplyOutcome::default(),
        }
    }

    fn apply_system_init(&mut self, init: &SystemInit) -> ApplyOutcome {
        let mut cwd_changed = None;
        if let Some(cwd) = &init.cwd {
            cwd_changed = Some(cwd.clone());
        }
        if let Some(model) = &init.model {
            self.state.model = Some(model.clone());
        }
        if let Some(cmds) = &init.slash_commands {
            self.state.slash_commands = Some(cmds.clone());
        }
        self.state.connected = true;
        self.state.status = SessionStatus::Working;

        self.text_buffers.clear();
        self.thinking_buffers.clear();
        self.input_buffers.clear();
        self.block_meta.clear();
        self.pending_message = None;
        self.last_seen_message_id = None;
        self.pending_thinking = None;

        let mut outcome = self.emit(Delta::Status {
            status: SessionStatus::Working,
        });
        if self.is_live() {
            outcome.cwd_changed = cwd_changed;
        }
        outcome
    }

    fn apply_message_start(&mut self) -> ApplyOutcome {
        self.text_buffers.clear();
        self.thinking_buffers.clear();
        self.input_buffers.clear();
        self.block_meta.clear();

        let stream_id = MessageId::from(fresh_stream_id());
        self.current_stream_id = Some(stream_id.clone());
        self.emit(Delta::Activity {
            message_id: stream_id,
            kind: ActivityKind::MessageStart,
        })
    }

    fn apply_message_stop(&mut self) -> ApplyOutcome {
        let Some(stream_id) = self.current_stream_id.take() else {
            return ApplyOutcome::default();
        };
        self.emit(Delta::Activity {
            message_id: stream_id,
            kind: ActivityKind::MessageStop,
        })
    }

    fn apply_block_delta(&mut self, index: u32, delta: &StreamDelta) -> ApplyOutcome {
        match delta {
            StreamDelta::Text(chunk) => {
                self.text_buffers.entry(index).or_default().push_str(chunk);
            }
            StreamDelta::Thinking(chunk) => {
                self.thinking_buffers
                    .entry(index)
                    .or_default()
                    .push_str(chunk);
            }
            StreamDelta::InputJson(chunk) => {
                self.input_buffers.entry(index).or_default().push_str(chunk);
            }
            StreamDelta::Signature(_) => {
                // Signature is attached at block-stop from the assistant-
                // complete content array instead; live streaming ignores it.
            }
        }
        ApplyOutcome::default()
    }

    fn apply_block_stop(&mut self, index: u32) -> ApplyOutcome {
        let Some(meta) = self.block_meta.get(&index).cloned() else {
            return ApplyOutcome::default();
        };
        match meta.kind {
            Some(BlockKind::Text) => {
                let Some(text) = self.text_buffers.get(&index) else {
                    return ApplyOutcome::default();
                };
                self.emit(Delta::Content {
                    index,
                    text: text.clone(),
                })
            }
            Some(BlockKind::Thinking) => {
                let Some(text) = self.thinking_buffers.get(&index).filter(|t| !t.is_empty())
                else {
                    return ApplyOutcome::default();
                };
                self.pending_thinking = Some(match self.pending_thinking.take() {
                    Some(acc) if !acc.is_empty() => format!("{acc}\n\n{text}"),
                    _ => text.clone(),
                });
                self.emit(Delta::ThinkingContent {
                    index,
                    text: text.clone(),
                })
            }
            Some(BlockKind::ToolUse) => {
                let raw = self.input_buffers.get(&index).cloned().unwrap_or_default();
                let parsed: serde_json::Value =
                    serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
                let name = meta.name.clone().unwrap_or_default();
                let id = meta.id.clone().unwrap_or_default();
                let rendered = display_input(&name, &parsed);
                self.emit(Delta::ToolStart {
                    index,
                    id: ToolCallId::from(id),
                    name,
                    display_input: rendered,
                })
            }
            None => ApplyOutcome::default(),
        }
    }

    fn apply_assistant_complete(&mut self, ac: &AssistantComplete) -> ApplyOutcome {
        let incoming_id = MessageId::from(ac.message_id.clone());
        let mut outcome = ApplyOutcome::default();

        let is_same_message = self.last_seen_message_id.as_ref() == Some(&incoming_id);
        if !is_same_message {
            if let Some(prior) = self.pending_message.take() {
                self.state.messages.push(Message::Assistant(prior));
            }
        }

        let mut message = if is_same_message {
            self.pending_message
                .take()
                .unwrap_or_else(|| AssistantMessage::new(incoming_id.clone()))
        } else {
            AssistantMessage::new(incoming_id.clone())
        };

        message.usage = ac.usage;
        message.stop_reason = ac.stop_reason.clone();
        message.content.clear();
        message.tool_calls.clear();

        for (position, block) in ac.content.iter().enumerate() {
            let index = position as u32;
            match block {
                ContentBlock::Text { text } => {
                    message.content.push(ContentItem::Text { text: text.clone() });
                    // assistant-complete may arrive before the matching
                    // block-stop (spec.md §4.C ordering tolerance); overwrite
                    // the streamed accumulator so a still-pending block-stop
                    // emits this definitive text rather than a partial one.
                    self.text_buffers.insert(index, text.clone());
                }
                ContentBlock::Thinking { text, signature } => {
                    message.content.push(ContentItem::Thinking {
                        text: text.clone(),
                        signature: signature.clone(),
                    });
                    self.thinking_buffers.insert(index, text.clone());
                }
                ContentBlock::ToolUse { id, name, input } => {
                    let tool_id = ToolCallId::from(id.clone());
                    message
                        .content
                        .push(ContentItem::ToolUse { id: tool_id.clone() });

                    let rendered = display_input(name, input);
                    let call = ToolCall::new(tool_id, name.clone(), rendered);
                    if name == ASK_USER_QUESTION_TOOL && self.is_live() {
                        outcome.ask_user = Some(call);
                    } else {
                        message.tool_calls.push(call);
                    }
                }
            }
        }

        if let Some(thinking) = self.pending_thinking.take() {
            message.thinking = Some(thinking);
        }

        self.pending_message = Some(message);
        self.last_seen_message_id = Some(incoming_id);
        self.state.current_streaming_message = self.pending_message.clone();

        outcome
    }

    fn apply_api_error(&mut self, message: &str) -> ApplyOutcome {
        let id = MessageId::from(fresh_stream_id());
        let mut m = AssistantMessage::new(id);
        m.content.push(ContentItem::Text {
            text: message.to_string(),
        });
        self.state.messages.push(Message::Assistant(m));
        self.state.status = SessionStatus::Idle;
        self.state.latest_error = Some(message.to_string());
        self.state.current_streaming_message = None;
        self.pending_message = None;
        self.last_seen_message_id = None;

        self.emit(Delta::ApiError {
            message: message.to_string(),
        })
    }

    fn apply_user_text(&mut self, text: &str) -> ApplyOutcome {
        const MARKER_PREFIX: &str = "[gueridon:";
        let (text, synthetic) = if let Some(rest) = text.strip_prefix(MARKER_PREFIX) {
            match rest.find(']') {
                Some(close) => (rest[close + 1..].to_string(), true),
                None => (text.to_string(), false),
            }
        } else {
            (text.to_string(), false)
        };
        self.state.messages.push(Message::UserText { text, synthetic });
        ApplyOutcome::default()
    }

    fn apply_tool_results(&mut self, results: &[DecodedToolResult]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let Some(Message::Assistant(last)) = self
            .state
            .messages
            .iter_mut()
            .rev()
            .find(|m| matches!(m, Message::Assistant(_)))
        else {
            return outcome;
        };

        for result in results {
            let tool_id = ToolCallId::from(result.tool_use_id.clone());
            if let Some(call) = last.tool_call_mut(&tool_id) {
                call.complete(result.text.clone(), result.is_error);
                outcome.deltas.extend(
                    self.emit(Delta::ToolComplete {
                        id: tool_id,
                        status: if result.is_error {
                            ToolCallStatus::Error
                        } else {
                            ToolCallStatus::Completed
                        },
                        output: result.text.clone(),
                    })
                    .deltas,
                );
            }
            // Tool calls filtered as ask-user-question during live operation
            // have no entry on `last`; their results are silently dropped
            // (spec.md §4.C: suppressed during live operation).
        }
        outcome
    }

    fn apply_turn_result(&mut self, result: &TurnResult) -> ApplyOutcome {
        if let Some(prior) = self.pending_message.take() {
            self.state.messages.push(Message::Assistant(prior));
        }
        self.last_seen_message_id = None;
        self.state.current_streaming_message = None;

        self.state.status = match result.subtype {
            Some(TurnSubtype::Error) | Some(TurnSubtype::ErrorMaxTurns) => {
                self.state.latest_error = result.summary.clone();
                SessionStatus::Error
            }
            _ => SessionStatus::Idle,
        };

        let window = result.context_window_or_default();
        let total_input = result
            .usage_by_model
            .first()
            .map(|(_, u)| u.input_tokens + u.cache_read_tokens + u.cache_creation_tokens)
            .unwrap_or(0);
        let percent = if window == 0 {
            0
        } else {
            ((total_input as f64 * 100.0) / window as f64).floor() as u8
        };
        self.state.context_percent = percent.min(100);

        let mut outcome = self.emit(Delta::Status {
            status: self.state.status,
        });

        if let Some(prior_total) = self.last_turn_total_input {
            if prior_total >= COMPACTION_MIN_INPUT_TOKENS && total_input < prior_total {
                let drop_fraction = (prior_total - total_input) as f64 / prior_total as f64;
                if drop_fraction > COMPACTION_DROP_FRACTION {
                    outcome.compaction_detected = self.is_live();
                }
            }
        }
        self.last_turn_total_input = Some(total_input);

        outcome
    }
}

fn fresh_stream_id() -> String {
    // No uuid dependency pulled into this crate solely for an internal,
    // never-serialized-to-the-wire correlation id; a counter keyed by
    // address entropy is unnecessary here since collisions only matter
    // within the lifetime of a single open message.
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("stream-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{decode_event, ModelUsage};
    use gueridon_core::{FolderName, SessionId};
    use serde_json::json;

    fn fresh_state() -> SessionState {
        SessionState::new(SessionId::from("s1"), FolderName::from("alpha"))
    }

    fn decode(v: serde_json::Value) -> DecodedEvent {
        decode_event(&v)
    }

    /// S1 — simple text turn.
    #[test]
    fn s1_simple_text_turn() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(
            json!({"type":"system","subtype":"init","model":"m","session_id":"s1","cwd":"/x"}),
        ));
        b.apply(&decode(
            json!({"type":"stream_event","event":{"type":"message_start","message":{"id":"m1"}}}),
        ));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello "}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"world"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_stop","index":0}})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"Hello world"}],"usage":{"input_tokens":100,"output_tokens":2}}})));
        b.apply(&decode(
            json!({"type":"result","subtype":"success","modelUsage":{"m":{"contextWindow":200000}}}),
        ));

        let state = b.state();
        assert_eq!(state.messages.len(), 1);
        let Message::Assistant(m) = &state.messages[0] else {
            panic!("expected assistant message");
        };
        assert_eq!(m.content, vec![ContentItem::Text { text: "Hello world".into() }]);
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.context_percent, 0);
    }

    /// S2 — tool call.
    #[test]
    fn s2_tool_call() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init","model":"m"})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"message_start","message":{"id":"m1"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"shell"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"comma"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"nd\":\"ls -la\"}"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_stop","index":0}})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"tool_use","id":"t1","name":"shell","input":{"command":"ls -la"}}]}})));
        b.apply(&decode(json!({"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"file1\nfile2"}]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        let Message::Assistant(m) = &b.state().messages[0] else {
            panic!("expected assistant message");
        };
        assert_eq!(m.tool_calls.len(), 1);
        assert_eq!(m.tool_calls[0].name, "shell");
        assert_eq!(m.tool_calls[0].display_input, "ls -la");
        assert_eq!(m.tool_calls[0].status, ToolCallStatus::Completed);
        assert_eq!(m.tool_calls[0].output.as_deref(), Some("file1\nfile2"));
    }

    /// S3 — parallel tool calls.
    #[test]
    fn s3_parallel_tool_calls() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[
            {"type":"tool_use","id":"t1","name":"file-read","input":{"file_path":"/a"}},
            {"type":"tool_use","id":"t2","name":"file-read","input":{"file_path":"/b"}}
        ]}})));
        b.apply(&decode(json!({"type":"user","message":{"content":[
            {"type":"tool_result","tool_use_id":"t1","content":"A"},
            {"type":"tool_result","tool_use_id":"t2","content":"B"}
        ]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        let Message::Assistant(m) = &b.state().messages[0] else {
            panic!("expected assistant message");
        };
        assert_eq!(m.tool_calls.len(), 2);
        assert_eq!(m.tool_calls[0].status, ToolCallStatus::Completed);
        assert_eq!(m.tool_calls[1].status, ToolCallStatus::Completed);
        assert_eq!(m.tool_calls[0].display_input, "/a");
        assert_eq!(m.tool_calls[1].display_input, "/b");
        assert_eq!(m.tool_calls[0].output.as_deref(), Some("A"));
        assert_eq!(m.tool_calls[1].output.as_deref(), Some("B"));
    }

    /// S4 — dedup by id, inner-API split.
    #[test]
    fn s4_dedup_and_inner_api_split() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"message_start","message":{"id":"m1"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"A"}}})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"A"}]}})));
        // No intervening message-start: a second distinct id arrives.
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"B"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_stop","index":0}})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m2","content":[{"type":"text","text":"B"}]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        let messages = &b.state().messages;
        assert_eq!(messages.len(), 2);
        let Message::Assistant(m1) = &messages[0] else {
            panic!()
        };
        let Message::Assistant(m2) = &messages[1] else {
            panic!()
        };
        assert_eq!(m1.content, vec![ContentItem::Text { text: "A".into() }]);
        assert_eq!(m2.content, vec![ContentItem::Text { text: "B".into() }]);
        assert!(m1.tool_calls.is_empty());
        assert!(m2.tool_calls.is_empty());
    }

    #[test]
    fn same_id_assistant_complete_merges_not_duplicates() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"partial"}]}})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"partial complete"}]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        assert_eq!(b.state().messages.len(), 1);
        let Message::Assistant(m) = &b.state().messages[0] else {
            panic!()
        };
        assert_eq!(
            m.content,
            vec![ContentItem::Text {
                text: "partial complete".into()
            }]
        );
    }

    #[test]
    fn assistant_complete_before_block_stop_emits_definitive_text() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"message_start","message":{"id":"m1"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}})));
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}})));
        // assistant-complete arrives before the block-stop that would
        // normally finalize the text (spec.md §4.C ordering tolerance).
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"Hello world"}]}})));
        let outcome = b.apply(&decode(
            json!({"type":"stream_event","event":{"type":"content_block_stop","index":0}}),
        ));
        assert_eq!(
            outcome.deltas,
            vec![Delta::Content {
                index: 0,
                text: "Hello world".into()
            }]
        );
    }

    #[test]
    fn block_stop_without_delta_emits_no_content_delta() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}})));
        let outcome = b.apply(&decode(
            json!({"type":"stream_event","event":{"type":"content_block_stop","index":0}}),
        ));
        assert!(outcome.deltas.is_empty());
    }

    #[test]
    fn synthetic_marker_is_stripped_and_flagged() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(
            json!({"type":"user","message":{"content":"[gueridon:system] resumed"}}),
        ));
        let Message::UserText { text, synthetic } = &b.state().messages[0] else {
            panic!()
        };
        assert_eq!(text, " resumed");
        assert!(synthetic);
    }

    #[test]
    fn non_marker_bracket_text_is_left_untouched() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(
            json!({"type":"user","message":{"content":"[not-a-marker] hi"}}),
        ));
        let Message::UserText { text, synthetic } = &b.state().messages[0] else {
            panic!()
        };
        assert_eq!(text, "[not-a-marker] hi");
        assert!(!synthetic);
    }

    #[test]
    fn api_error_in_live_emits_delta_and_message() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        let outcome = b.apply_api_error("Overloaded");
        assert_eq!(b.state().messages.len(), 1);
        assert_eq!(b.state().status, SessionStatus::Idle);
        assert_eq!(outcome.deltas.len(), 1);
    }

    #[test]
    fn api_error_in_replay_adds_message_without_delta() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Replay);
        let outcome = b.apply_api_error("Overloaded");
        assert_eq!(b.state().messages.len(), 1);
        assert!(outcome.deltas.is_empty());
    }

    #[test]
    fn repeated_identical_api_errors_are_not_deduplicated() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply_api_error("boom");
        b.apply_api_error("boom");
        assert_eq!(b.state().messages.len(), 2);
    }

    #[test]
    fn ask_user_question_filtered_live_but_surfaced() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        let outcome = b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[
            {"type":"tool_use","id":"t1","name":"AskUserQuestion","input":{"question":"Which?"}}
        ]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        assert!(outcome.ask_user.is_some());
        let Message::Assistant(m) = &b.state().messages[0] else {
            panic!()
        };
        assert!(m.tool_calls.is_empty());
    }

    #[test]
    fn ask_user_question_retained_during_replay() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Replay);
        b.apply(&decode(json!({"type":"system","subtype":"init"})));
        b.apply(&decode(json!({"type":"assistant","message":{"id":"m1","content":[
            {"type":"tool_use","id":"t1","name":"AskUserQuestion","input":{"question":"Which?"}}
        ]}})));
        b.apply(&decode(json!({"type":"result","subtype":"success"})));

        let Message::Assistant(m) = &b.state().messages[0] else {
            panic!()
        };
        assert_eq!(m.tool_calls.len(), 1);
    }

    #[test]
    fn compaction_detected_on_large_drop_above_minimum() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        let big = TurnResult {
            subtype: Some(TurnSubtype::Success),
            usage_by_model: vec![(
                "m".into(),
                ModelUsage {
                    context_window: 200_000,
                    input_tokens: 25_000,
                    ..Default::default()
                },
            )],
            summary: None,
        };
        b.apply_turn_result(&big);
        let small = TurnResult {
            subtype: Some(TurnSubtype::Success),
            usage_by_model: vec![(
                "m".into(),
                ModelUsage {
                    context_window: 200_000,
                    input_tokens: 5_000,
                    ..Default::default()
                },
            )],
            summary: None,
        };
        let outcome = b.apply_turn_result(&small);
        assert!(outcome.compaction_detected);
    }

    #[test]
    fn no_compaction_below_minimum_input_threshold() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        let small_turn = TurnResult {
            subtype: Some(TurnSubtype::Success),
            usage_by_model: vec![(
                "m".into(),
                ModelUsage {
                    context_window: 200_000,
                    input_tokens: 1_000,
                    ..Default::default()
                },
            )],
            summary: None,
        };
        b.apply_turn_result(&small_turn);
        let outcome = b.apply_turn_result(&TurnResult {
            subtype: Some(TurnSubtype::Success),
            usage_by_model: vec![(
                "m".into(),
                ModelUsage {
                    context_window: 200_000,
                    input_tokens: 100,
                    ..Default::default()
                },
            )],
            summary: None,
        });
        assert!(!outcome.compaction_detected);
    }

    #[test]
    fn context_percent_computed_from_window() {
        let mut b = StateBuilder::new(fresh_state(), Mode::Live);
        b.apply_turn_result(&TurnResult {
            subtype: Some(TurnSubtype::Success),
            usage_by_model: vec![(
                "m".into(),
                ModelUsage {
                    context_window: 200_000,
                    input_tokens: 50_000,
                    ..Default::default()
                },
            )],
            summary: None,
        });
        assert_eq!(b.state().context_percent, 25);
    }
}
