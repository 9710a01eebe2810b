// SPDX-License-Identifier: MIT

//! Message and content types (spec.md §3, "Message").

use crate::id::{MessageId, ToolCallId};
use serde::{Deserialize, Serialize};

/// Token usage reported on an `assistant-complete` or `turn-result` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

/// Status of a tool invocation.
///
/// Invariant (spec.md §3): a tool-call's `output` is populated only after
/// the matching tool-result event is observed; until then status is
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Completed,
    Error,
}

/// A single tool invocation attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    /// Display-projected input (spec.md §4.C "display input"), falling back
    /// to raw compact JSON for tools without a dedicated projection.
    pub display_input: String,
    pub status: ToolCallStatus,
    pub output: Option<String>,
}

impl ToolCall {
    pub fn new(id: ToolCallId, name: impl Into<String>, display_input: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_input: display_input.into(),
            status: ToolCallStatus::Running,
            output: None,
        }
    }

    pub fn complete(&mut self, output: String, is_error: bool) {
        self.status = if is_error {
            ToolCallStatus::Error
        } else {
            ToolCallStatus::Completed
        };
        self.output = Some(output);
    }
}

/// One entry in an assistant message's ordered content, in emission order
/// (spec.md §3: "text, thinking, and tool-call entries in emission order").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    Thinking { text: String, signature: Option<String> },
    ToolUse { id: ToolCallId },
}

/// A fully-formed assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: MessageId,
    pub content: Vec<ContentItem>,
    pub usage: Usage,
    /// Concatenation of all thinking blocks in this message, blank-line
    /// separated (spec.md §4.C).
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
}

impl AssistantMessage {
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            content: Vec::new(),
            usage: Usage::default(),
            thinking: None,
            tool_calls: Vec::new(),
            stop_reason: None,
        }
    }

    pub fn tool_call_mut(&mut self, id: &ToolCallId) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|tc| &tc.id == id)
    }
}

/// A single tool-result block carried by a `user-or-tool-result` event,
/// retained verbatim on a `UserToolResult` message for transcript fidelity
/// even though its effect (attaching to the matching tool call) has already
/// been applied by the state builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultItem {
    pub tool_use_id: ToolCallId,
    pub text: String,
    pub is_error: bool,
}

/// A message in session history (spec.md §3: "user-text, user-tool-result,
/// assistant, synthetic").
///
/// Two distinct things both end up looking "synthetic" to a client, and
/// it matters which this is:
/// - `UserText { synthetic: true, .. }` is a real child-observed user
///   event whose body happened to start with a `[gueridon:<kind>]`
///   marker — the marker was stripped but the text did round-trip through
///   the child (e.g. a context-band note prepended to an outgoing prompt,
///   later echoed back in the child's own event stream).
/// - `Synthetic` is inserted directly into state by the runtime without
///   any backing child event at all (e.g. the resumption notice on
///   binding to an externally-restarted child, prepared before any
///   system-init has been observed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    UserText { text: String, synthetic: bool },
    UserToolResult { results: Vec<ToolResultItem> },
    Assistant(AssistantMessage),
    Synthetic { text: String },
}
