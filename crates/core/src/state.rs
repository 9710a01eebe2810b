// SPDX-License-Identifier: MIT

//! Session state (spec.md §3, "Session state").

use crate::id::{FolderName, SessionId};
use crate::message::{AssistantMessage, Message};
use serde::{Deserialize, Serialize};

/// A slash command advertised by `system-init`, either a bare name or a
/// `{name, description}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlashCommand {
    Bare(String),
    Described { name: String, description: String },
}

impl SlashCommand {
    pub fn name(&self) -> &str {
        match self {
            SlashCommand::Bare(n) => n,
            SlashCommand::Described { name, .. } => name,
        }
    }
}

/// High-level turn status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Working,
    Idle,
    Error,
}

/// Structured session state, folded from the child's raw event stream by
/// the state builder (spec.md §4.C).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub folder: FolderName,
    pub model: Option<String>,
    pub context_percent: u8,
    pub messages: Vec<Message>,
    pub current_streaming_message: Option<AssistantMessage>,
    pub status: SessionStatus,
    pub latest_error: Option<String>,
    pub slash_commands: Option<Vec<SlashCommand>>,
    pub connected: bool,
}

impl SessionState {
    pub fn new(session_id: SessionId, folder: FolderName) -> Self {
        Self {
            session_id,
            folder,
            model: None,
            context_percent: 0,
            messages: Vec::new(),
            current_streaming_message: None,
            status: SessionStatus::Idle,
            latest_error: None,
            slash_commands: None,
            connected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_command_untagged_parses_both_shapes() {
        let bare: SlashCommand = serde_json::from_str("\"help\"").unwrap();
        assert_eq!(bare.name(), "help");

        let described: SlashCommand =
            serde_json::from_str("{\"name\":\"compact\",\"description\":\"compact context\"}")
                .unwrap();
        assert_eq!(described.name(), "compact");
    }

    #[test]
    fn new_state_is_idle_and_disconnected() {
        let s = SessionState::new(SessionId::new("s1"), FolderName::new("alpha"));
        assert_eq!(s.status, SessionStatus::Idle);
        assert!(!s.connected);
        assert!(s.slash_commands.is_none());
    }
}
