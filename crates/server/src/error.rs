// SPDX-License-Identifier: MIT

//! HTTP error mapping (spec.md §7): every crate's own error type converts
//! into a status code plus a JSON body at this one boundary, grounded on
//! the teacher's `ConnectionError` (`daemon/src/listener/mod.rs`) — a flat
//! enum matched once, here against `axum::http::StatusCode` instead of a
//! wire-protocol error code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gueridon_core::CoreError;
use gueridon_fanout::FanoutError;
use gueridon_runtime::RuntimeError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Fanout(#[from] FanoutError),
    #[error("no runtime exists for folder {0:?}")]
    NoRuntime(String),
    #[error("request body exceeds the 1 MiB limit")]
    PayloadTooLarge,
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("upload rejected: {0}")]
    Upload(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Core(CoreError::InvalidFolderName(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Core(CoreError::PathOutsideScanRoot(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Runtime(RuntimeError::LobbyPrompt) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Runtime(RuntimeError::PromptTooLarge) => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::Runtime(RuntimeError::NoRuntime(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::Runtime(RuntimeError::ShuttingDown(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::Runtime(RuntimeError::Core(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Runtime(RuntimeError::Spawn { .. } | RuntimeError::StdinWrite(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ServerError::NoRuntime(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Upload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Fanout(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_folder_name_is_bad_request_mentioning_invalid_folder() {
        let err = ServerError::from(CoreError::InvalidFolderName("Bad".into()));
        assert!(err.to_string().contains("invalid folder"));
    }

    #[test]
    fn path_outside_scan_root_message_mentions_scan_root() {
        let err = ServerError::from(CoreError::PathOutsideScanRoot("../x".into()));
        assert!(err.to_string().contains("scan root"));
    }

    #[test]
    fn lobby_prompt_message_mentions_lobby() {
        let err = ServerError::from(RuntimeError::LobbyPrompt);
        assert!(err.to_string().contains("lobby"));
    }
}
