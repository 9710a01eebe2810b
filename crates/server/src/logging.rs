// SPDX-License-Identifier: MIT

//! Logging setup, grounded on the teacher's `setup_logging`
//! (`daemon/src/main.rs`): a non-blocking rolling file appender plus an
//! `EnvFilter`, defaulting to `info` when `RUST_LOG` is unset.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialise the global tracing subscriber, writing to
/// `<config_dir>/gueridond.log` via a non-blocking appender. The returned
/// guard must be held for the process lifetime; dropping it stops the
/// background flush thread.
pub fn init_logging(
    config_dir: &Path,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(config_dir)?;

    let file_appender = tracing_appender::rolling::never(config_dir, "gueridond.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(guard)
}
