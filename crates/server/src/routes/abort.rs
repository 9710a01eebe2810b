// SPDX-License-Identifier: MIT

//! `POST /abort/:folder` (spec.md §6): interrupt the in-flight turn.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use gueridon_core::FolderName;
use gueridon_runtime::RuntimeCommand;
use serde_json::Value;
use tokio::sync::oneshot;

pub async fn abort(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let folder = FolderName::new(folder);
    let sender = state
        .registry
        .lookup(&folder)
        .ok_or_else(|| ServerError::NoRuntime(folder.as_str().to_string()))?;

    let (tx, rx) = oneshot::channel();
    sender
        .send(RuntimeCommand::Abort { reply: tx })
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;
    rx.await
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))??;

    Ok(Json(serde_json::json!({ "aborted": true })))
}
