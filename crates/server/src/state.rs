// SPDX-License-Identifier: MIT

//! Shared axum state (spec.md §9 "a single *SessionRegistry*... lifecycle
//! tied to the process").

use crate::registry::SessionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}
