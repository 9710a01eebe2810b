// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gueridon-server: the transport surface (spec.md §4.G) — HTTP routes,
//! websocket and SSE multiplexing, upload handling, logging, and the
//! orphan-reaper wiring that ties `gueridon-fanout`'s records file to the
//! live `SessionRegistry`.

pub mod error;
pub mod logging;
pub mod mime_sniff;
pub mod reaper;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::ServerError;
pub use registry::SessionRegistry;
pub use routes::build_router;
pub use state::AppState;
