// SPDX-License-Identifier: MIT

//! Shared error taxonomy (spec.md §7).

use thiserror::Error;

/// Errors surfaced by `gueridon-core` itself (mostly id/config validation).
/// Component-specific errors (decode, runtime, fan-out) live in their own
/// crates and convert into this where they cross a shared boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid folder name {0:?}: fails the scanner's name policy")]
    InvalidFolderName(String),

    #[error("path {0:?} does not resolve within the scan root")]
    PathOutsideScanRoot(String),
}
