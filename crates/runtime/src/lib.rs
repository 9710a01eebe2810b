// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gueridon-runtime: the per-folder session runtime (spec.md §4.E) — child
//! process management, kill escalation, the prompt queue, and the
//! attach/replay surface the transport layer drives.

pub mod child;
pub mod error;
pub mod runtime;

pub use error::RuntimeError;
pub use runtime::{
    spawn_runtime, AttachReply, PromptAck, PromptContent, RuntimeCommand, SessionRuntime,
};
