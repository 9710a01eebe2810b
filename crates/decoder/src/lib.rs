// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gueridon-decoder: pure event decoding, delta conflation, and the state
//! builder that folds a child's raw event stream into session state.

pub mod builder;
pub mod conflator;
pub mod event;
pub mod tool_input;

pub use builder::{ApplyOutcome, Mode, StateBuilder, ASK_USER_QUESTION_TOOL};
pub use conflator::Conflator;
pub use event::{
    decode_event, AssistantComplete, BlockKind, ContentBlock, DecodedEvent, DecodedToolResult,
    ModelUsage, StreamDelta, SystemInit, TurnResult, TurnSubtype,
};
pub use tool_input::display_input;
