// SPDX-License-Identifier: MIT

//! `POST /prompt/:folder` (spec.md §6): deliver a prompt to the folder's
//! runtime, auto-creating it unless the caller opts out with
//! `?create=false`.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use gueridon_core::FolderName;
use gueridon_runtime::{PromptContent, RuntimeCommand};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

#[derive(Debug, Deserialize)]
pub struct PromptQuery {
    #[serde(default = "default_create")]
    pub create: bool,
}

fn default_create() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub text: Option<String>,
    pub content: Option<Value>,
}

pub async fn send_prompt(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Query(query): Query<PromptQuery>,
    Json(body): Json<PromptBody>,
) -> Result<Json<Value>, ServerError> {
    let folder = FolderName::new(folder);

    let content = match (body.text, body.content) {
        (Some(text), None) => PromptContent::Text(text),
        (None, Some(content)) => PromptContent::Blocks(content),
        (Some(_), Some(_)) => {
            return Err(ServerError::BadRequest(
                "prompt body must set exactly one of `text` or `content`".to_string(),
            ))
        }
        (None, None) => {
            return Err(ServerError::BadRequest(
                "prompt body must set `text` or `content`".to_string(),
            ))
        }
    };

    let sender = if query.create {
        state.registry.get_or_create(&folder)?
    } else {
        state
            .registry
            .lookup(&folder)
            .ok_or_else(|| ServerError::NoRuntime(folder.as_str().to_string()))?
    };

    let (tx, rx) = oneshot::channel();
    sender
        .send(RuntimeCommand::Prompt { content, reply: tx })
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;
    let ack = rx
        .await
        .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))??;

    Ok(Json(serde_json::json!({
        "queued": ack.queued,
        "position": ack.position,
    })))
}
