// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gueridon-fanout: folder scanner, fan-out/replay ring, name generator, and
//! orphan reaper.

pub mod error;
pub mod names;
pub mod reaper;
pub mod ring;
pub mod scanner;

pub use error::FanoutError;
pub use names::generate_folder_name;
pub use reaper::{delete_records, load_records, reap, write_records, Debouncer, OrphanRecord};
pub use ring::{FanoutRing, Frame, FrameKind, RING_MAX_BYTES, RING_MAX_FRAMES};
pub use scanner::{resumable_session, scan};
