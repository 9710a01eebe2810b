// SPDX-License-Identifier: MIT

//! Errors raised by the session runtime.
//!
//! Grounded on the teacher's `RuntimeError` (`engine/src/error.rs`): a flat
//! thiserror enum covering spawn failure, I/O on the child's pipes, and
//! runtime-queue shutdown, rather than a layered error hierarchy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn agent child in {folder}: {source}")]
    Spawn {
        folder: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write to child stdin: {0}")]
    StdinWrite(#[source] std::io::Error),
    #[error("runtime for {0} has already shut down")]
    ShuttingDown(String),
    #[error("no runtime exists for folder {0}")]
    NoRuntime(String),
    #[error("prompt rejected: client is bound to the lobby, not a folder")]
    LobbyPrompt,
    #[error("prompt body exceeds the 1 MiB limit")]
    PromptTooLarge,
    #[error(transparent)]
    Core(#[from] gueridon_core::CoreError),
}
