// SPDX-License-Identifier: MIT

//! HTTP/WS/SSE routes (spec.md §4.G, §6). Grounded on the teacher's request
//! dispatch in `daemon/src/listener/mod.rs::handle_request` — one handler
//! function per request shape, sharing one context via `Arc`, matched here
//! against `axum::Router` routes instead of a wire-protocol enum.

pub mod abort;
pub mod events_sse;
pub mod exit;
pub mod folders;
pub mod prompt;
pub mod session;
pub mod shell;
pub mod upload;
pub mod ws;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use gueridon_fanout::{Frame, FrameKind};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Wrap one fan-out [`Frame`] as the `source:"cc"` wire envelope both the
/// websocket and SSE transports send (spec.md §4.G "every outbound message
/// is a JSON object tagged with `source`"). The frame's own payload is
/// already-serialized JSON (a `state` snapshot or a `delta`); this only adds
/// the envelope fields around it.
pub fn wire_envelope_for_frame(frame: &Frame) -> Value {
    let inner: Value = serde_json::from_str(&frame.payload).unwrap_or(Value::Null);
    let kind = match frame.kind {
        FrameKind::State => "state",
        FrameKind::Delta => "delta",
    };
    let mut envelope = json!({
        "source": "cc",
        "type": kind,
        "folder": frame.folder,
        "seq": frame.seq,
    });
    if let Some(obj) = envelope.as_object_mut() {
        obj.insert(kind.to_string(), inner);
    }
    envelope
}

/// Build the full router: every HTTP/WS/SSE route, CORS, and request
/// tracing (spec.md §6 "CORS: `*` allow-origin on all HTTP responses").
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(shell::serve_shell))
        .route("/folders", get(folders::list_folders))
        .route("/events", get(events_sse::events))
        .route("/ws", get(ws::ws_handler))
        .route("/session/{folder}", post(session::create_session))
        .route("/prompt/{folder}", post(prompt::send_prompt))
        .route("/abort/{folder}", post(abort::abort))
        .route("/exit/{folder}", post(exit::exit))
        .route("/upload/{folder}", post(upload::upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
