// SPDX-License-Identifier: MIT

//! `POST /session/:folder` (spec.md §6): creates (or reattaches) the
//! runtime for `folder` and returns its current session id plus a state
//! snapshot, without yet subscribing the caller to the fan-out stream
//! (subscription happens over `/ws` or `/events`).

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use gueridon_core::FolderName;
use gueridon_runtime::RuntimeCommand;
use serde_json::Value;
use tokio::sync::oneshot;

pub async fn create_session(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let folder = FolderName::new(folder);
    let sender = state.registry.get_or_create(&folder)?;

    let (tx, rx) = oneshot::channel();
    sender
        .send(RuntimeCommand::Attach {
            last_event_id: None,
            reply: tx,
        })
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;
    let attached = rx
        .await
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;

    let state_value: Value =
        serde_json::from_str(&attached.snapshot.payload).unwrap_or(Value::Null);

    Ok(Json(serde_json::json!({
        "sessionId": attached.session_id,
        "folder": folder,
        "state": state_value,
    })))
}
