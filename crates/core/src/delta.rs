// SPDX-License-Identifier: MIT

//! Delta vocabulary emitted by the state builder (spec.md §4.C, "Delta
//! vocabulary").

use crate::id::{MessageId, ToolCallId};
use crate::message::ToolCallStatus;
use crate::state::SessionStatus;
use serde::{Deserialize, Serialize};

/// Marks a message-start/message-stop boundary so subscribers can reset
/// any client-local accumulation around inner API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MessageStart,
    MessageStop,
}

/// A small record describing a change just folded into session state. The
/// runtime tags each with a folder name and monotonic id before fan-out
/// (spec.md §4.C, §4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum Delta {
    Status {
        status: SessionStatus,
    },
    Activity {
        message_id: MessageId,
        kind: ActivityKind,
    },
    Content {
        index: u32,
        text: String,
    },
    ThinkingContent {
        index: u32,
        text: String,
    },
    ToolStart {
        index: u32,
        id: ToolCallId,
        name: String,
        display_input: String,
    },
    ToolComplete {
        id: ToolCallId,
        status: ToolCallStatus,
        output: String,
    },
    ApiError {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_serializes_with_tag() {
        let d = Delta::Content {
            index: 0,
            text: "hi".into(),
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["delta"], "content");
        assert_eq!(v["text"], "hi");
    }
}
