// SPDX-License-Identifier: MIT

//! `GET /folders` (spec.md §4.A, §6): the folder scanner's view, fed by the
//! registry's read-only live-snapshot.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

pub async fn list_folders(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let live = state.registry.live_snapshot().await;
    let descriptors = gueridon_fanout::scan(&state.registry.config().scan_root, &live)
        .map_err(ServerError::Fanout)?;
    Ok(Json(serde_json::json!({ "folders": descriptors })))
}
