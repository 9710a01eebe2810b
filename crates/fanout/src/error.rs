// SPDX-License-Identifier: MIT

//! Errors shared by the folder scanner, fan-out ring, and orphan reaper.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("scan root {0:?} does not exist or is not a directory")]
    ScanRootUnreadable(std::path::PathBuf),
    #[error("io error reading {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sessions record file {0:?} is not valid JSON")]
    RecordsCorrupt(std::path::PathBuf),
    #[error(transparent)]
    Core(#[from] gueridon_core::CoreError),
}
