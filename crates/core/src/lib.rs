// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gueridon-core: shared data model for the session broker.

pub mod config;
pub mod delta;
pub mod error;
pub mod folder;
pub mod id;
pub mod message;
pub mod state;

pub use config::{BrokerConfig, ConfigError};
pub use delta::{ActivityKind, Delta};
pub use error::CoreError;
pub use folder::{
    is_valid_folder_name, resolve_folder_path, FolderDescriptor, FolderLifecycle,
    LiveSessionSnapshot,
};
pub use id::{ClientId, FolderName, MessageId, SessionId, ShortId, ToolCallId};
pub use message::{
    AssistantMessage, ContentItem, Message, ToolCall, ToolCallStatus, ToolResultItem, Usage,
};
pub use state::{SessionState, SessionStatus, SlashCommand};
