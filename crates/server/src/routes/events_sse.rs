// SPDX-License-Identifier: MIT

//! `GET /events` (spec.md §4.F, §4.G): the server-sent-events transport.
//! Named events: `hello`, `folders`, `state`, `delta`, `ping`,
//! `history-start`, `history-end`. A `ping` fires at least every 30s; the
//! `state` snapshot for a folder always precedes any `delta` on the same
//! connection; replay frames (if any) are bracketed exactly by
//! `history-start` and `history-end` with no live frame interleaved.
//!
//! Folder resolution and replay attachment happen synchronously before the
//! stream is handed back, so a bad folder name or a dead runtime surfaces
//! as an ordinary HTTP error (spec.md §7) rather than a mid-stream event;
//! everything after that point — `ping` cadence, live frame forwarding —
//! runs in a background task feeding the SSE channel.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use gueridon_core::FolderName;
use gueridon_fanout::{Frame, FrameKind};
use gueridon_runtime::{AttachReply, RuntimeCommand};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tokio_stream::StreamExt as _;

const PING_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub folder: Option<String>,
    #[serde(default, rename = "lastEventId")]
    pub last_event_id: Option<u64>,
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let last_event_id = query.last_event_id.or_else(|| {
        headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    });

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    match query.folder {
        Some(folder) => {
            let folder = FolderName::new(folder);
            let sender = state.registry.get_or_create(&folder)?;

            let (attach_tx, attach_rx) = oneshot::channel();
            sender
                .send(RuntimeCommand::Attach {
                    last_event_id,
                    reply: attach_tx,
                })
                .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;
            let attached = attach_rx
                .await
                .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;

            let (frame_tx, frame_rx) = mpsc::unbounded_channel();
            let (sub_tx, sub_rx) = oneshot::channel();
            sender
                .send(RuntimeCommand::Subscribe {
                    sender: frame_tx,
                    reply: sub_tx,
                })
                .map_err(|_| ServerError::NoRuntime(folder.as_str().to_string()))?;
            let _ = sub_rx.await;

            tokio::spawn(run_folder_session(folder, sender, attached, frame_rx, tx));
        }
        None => {
            let live = state.registry.live_snapshot().await;
            let folders = gueridon_fanout::scan(&state.registry.config().scan_root, &live)?;
            tokio::spawn(run_lobby_session(folders, tx));
        }
    }

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream))
}

async fn run_folder_session(
    folder: FolderName,
    sender: mpsc::UnboundedSender<RuntimeCommand>,
    attached: AttachReply,
    mut frame_rx: mpsc::UnboundedReceiver<Frame>,
    tx: UnboundedSender<Event>,
) {
    if send(&tx, "hello", json!({"folder": folder})).is_err() {
        return;
    }
    if send_frame(&tx, &attached.snapshot).is_err() {
        return;
    }

    if let Some(replay) = attached.replay {
        if send(&tx, "history-start", json!({"folder": folder})).is_err() {
            let _ = sender.send(RuntimeCommand::Detach);
            return;
        }
        for frame in &replay {
            if send_frame(&tx, frame).is_err() {
                let _ = sender.send(RuntimeCommand::Detach);
                return;
            }
        }
        if send(&tx, "history-end", json!({"folder": folder})).is_err() {
            let _ = sender.send(RuntimeCommand::Detach);
            return;
        }
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&tx, &frame).is_err() { break; }
            }
            _ = ping.tick() => {
                if send(&tx, "ping", json!({})).is_err() { break; }
            }
            _ = tx.closed() => break,
        }
    }

    let _ = sender.send(RuntimeCommand::Detach);
}

async fn run_lobby_session(folders: Vec<gueridon_core::FolderDescriptor>, tx: UnboundedSender<Event>) {
    if send(&tx, "hello", json!({})).is_err() {
        return;
    }
    if send(&tx, "folders", json!({"folders": folders})).is_err() {
        return;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    loop {
        tokio::select! {
            _ = ping.tick() => {
                if send(&tx, "ping", json!({})).is_err() { break; }
            }
            _ = tx.closed() => break,
        }
    }
}

fn send(tx: &UnboundedSender<Event>, event: &str, data: serde_json::Value) -> Result<(), ()> {
    tx.send(Event::default().event(event).data(data.to_string()))
        .map_err(|_| ())
}

fn send_frame(tx: &UnboundedSender<Event>, frame: &Frame) -> Result<(), ()> {
    let event_name = match frame.kind {
        FrameKind::State => "state",
        FrameKind::Delta => "delta",
    };
    tx.send(
        Event::default()
            .id(frame.seq.to_string())
            .event(event_name)
            .data(frame.payload.to_string()),
    )
    .map_err(|_| ())
}
