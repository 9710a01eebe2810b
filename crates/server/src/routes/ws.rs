// SPDX-License-Identifier: MIT

//! `GET /ws` (spec.md §4.G): the websocket transport. A single connection
//! multiplexes *bridge-control* frames (`source:"bridge"`) and *child-event*
//! frames (`source:"cc"`) the way the spec's message-type vocabulary
//! describes — `listFolders`/`createFolder`/`connectFolder`/`prompt`/
//! `abort`/`deleteFolder` inbound, `lobbyConnected`/`folderList`/
//! `connected`/`promptReceived`/`promptQueued`/`processExit`/
//! `sessionClosed`/`error`/`historyStart`/`historyEnd`/`folderCreated`/
//! `folderDeleted` outbound.
//!
//! A connection starts unbound (the "lobby"); `connectFolder` binds it to
//! exactly one Session Runtime for the life of the socket (spec.md §3
//! "Every client registration is bound to exactly one Session Runtime or
//! to the lobby pseudo-session").

use crate::routes::wire_envelope_for_frame;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use gueridon_core::{resolve_folder_path, FolderName};
use gueridon_fanout::{generate_folder_name, scan};
use gueridon_runtime::{PromptContent, RuntimeCommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const PING_INTERVAL: Duration = Duration::from_secs(20);

type WsSink = SplitSink<WebSocket, Message>;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    ListFolders,
    CreateFolder {
        #[serde(default)]
        name: Option<String>,
    },
    ConnectFolder {
        folder: String,
        #[serde(default, rename = "lastEventId")]
        last_event_id: Option<u64>,
    },
    Prompt {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        content: Option<Value>,
    },
    Abort,
    DeleteFolder {
        folder: String,
    },
}

struct Bound {
    folder: FolderName,
    sender: mpsc::UnboundedSender<RuntimeCommand>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut bound: Option<Bound> = None;
    let mut frames: Option<mpsc::UnboundedReceiver<gueridon_fanout::Frame>> = None;
    let mut ping = tokio::time::interval(PING_INTERVAL);

    if send_bridge(&mut sink, "lobbyConnected", json!({})).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_text(&text, &state, &mut bound, &mut frames, &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            frame = recv_frame(&mut frames) => {
                let Some(frame) = frame else { continue };
                let env = wire_envelope_for_frame(&frame);
                if sink.send(Message::Text(env.to_string())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(bound) = &bound {
        let _ = bound.sender.send(RuntimeCommand::Detach);
    }
}

async fn recv_frame(
    frames: &mut Option<mpsc::UnboundedReceiver<gueridon_fanout::Frame>>,
) -> Option<gueridon_fanout::Frame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_client_text(
    text: &str,
    state: &AppState,
    bound: &mut Option<Bound>,
    frames: &mut Option<mpsc::UnboundedReceiver<gueridon_fanout::Frame>>,
    sink: &mut WsSink,
) -> Result<(), ()> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return send_bridge(sink, "error", json!({"message": format!("bad message: {e}")})).await;
        }
    };

    match msg {
        ClientMessage::ListFolders => {
            let live = state.registry.live_snapshot().await;
            match scan(&state.registry.config().scan_root, &live) {
                Ok(folders) => send_bridge(sink, "folderList", json!({"folders": folders})).await,
                Err(e) => send_bridge(sink, "error", json!({"message": e.to_string()})).await,
            }
        }
        ClientMessage::CreateFolder { name } => create_folder(state, name, sink).await,
        ClientMessage::ConnectFolder { folder, last_event_id } => {
            connect_folder(state, folder, last_event_id, bound, frames, sink).await
        }
        ClientMessage::Prompt { text, content } => prompt(bound, text, content, sink).await,
        ClientMessage::Abort => abort(bound, sink).await,
        ClientMessage::DeleteFolder { folder } => delete_folder(state, bound, folder, sink).await,
    }
}

async fn create_folder(
    state: &AppState,
    name: Option<String>,
    sink: &mut WsSink,
) -> Result<(), ()> {
    let live = state.registry.live_snapshot().await;
    let existing: HashSet<FolderName> = scan(&state.registry.config().scan_root, &live)
        .map(|descriptors| descriptors.into_iter().map(|d| d.name).collect())
        .unwrap_or_default();

    let folder_name = match name.filter(|n| !n.is_empty()) {
        Some(n) => FolderName::new(n),
        None => match generate_folder_name(&existing) {
            Some(n) => n,
            None => {
                return send_bridge(
                    sink,
                    "error",
                    json!({"message": "could not generate a unique folder name"}),
                )
                .await
            }
        },
    };

    let path = match resolve_folder_path(&state.registry.config().scan_root, folder_name.as_str()) {
        Ok(p) => p,
        Err(e) => return send_bridge(sink, "error", json!({"message": e.to_string()})).await,
    };

    match std::fs::create_dir_all(&path) {
        Ok(()) => send_bridge(sink, "folderCreated", json!({"folder": folder_name})).await,
        Err(e) => send_bridge(sink, "error", json!({"message": e.to_string()})).await,
    }
}

async fn connect_folder(
    state: &AppState,
    folder: String,
    last_event_id: Option<u64>,
    bound: &mut Option<Bound>,
    frames: &mut Option<mpsc::UnboundedReceiver<gueridon_fanout::Frame>>,
    sink: &mut WsSink,
) -> Result<(), ()> {
    if let Some(prior) = bound.take() {
        let _ = prior.sender.send(RuntimeCommand::Detach);
    }

    let folder = FolderName::new(folder);
    let sender = match state.registry.get_or_create(&folder) {
        Ok(s) => s,
        Err(e) => return send_bridge(sink, "error", json!({"message": e.to_string()})).await,
    };

    let (attach_tx, attach_rx) = oneshot::channel();
    if sender
        .send(RuntimeCommand::Attach {
            last_event_id,
            reply: attach_tx,
        })
        .is_err()
    {
        return send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await;
    }
    let Ok(attached) = attach_rx.await else {
        return send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await;
    };

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (sub_tx, sub_rx) = oneshot::channel();
    let _ = sender.send(RuntimeCommand::Subscribe {
        sender: frame_tx,
        reply: sub_tx,
    });
    let _ = sub_rx.await;

    *frames = Some(frame_rx);
    *bound = Some(Bound {
        folder: folder.clone(),
        sender,
    });

    let state_value: Value = serde_json::from_str(&attached.snapshot.payload).unwrap_or(Value::Null);
    send_bridge(
        sink,
        "connected",
        json!({"sessionId": attached.session_id, "folder": folder, "state": state_value}),
    )
    .await?;

    if let Some(replay) = attached.replay {
        send_bridge(sink, "historyStart", json!({"folder": folder})).await?;
        for frame in replay {
            let env = wire_envelope_for_frame(&frame);
            sink.send(Message::Text(env.to_string())).await.map_err(|_| ())?;
        }
        send_bridge(sink, "historyEnd", json!({"folder": folder})).await?;
    }

    Ok(())
}

async fn prompt(
    bound: &Option<Bound>,
    text: Option<String>,
    content: Option<Value>,
    sink: &mut WsSink,
) -> Result<(), ()> {
    let Some(bound) = bound else {
        return send_bridge(
            sink,
            "error",
            json!({"message": "no folder selected; client is bound to the lobby"}),
        )
        .await;
    };

    let content = match (text, content) {
        (Some(t), None) => PromptContent::Text(t),
        (None, Some(c)) => PromptContent::Blocks(c),
        _ => {
            return send_bridge(
                sink,
                "error",
                json!({"message": "prompt must set exactly one of text or content"}),
            )
            .await
        }
    };

    let (tx, rx) = oneshot::channel();
    if bound.sender.send(RuntimeCommand::Prompt { content, reply: tx }).is_err() {
        return send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await;
    }
    match rx.await {
        Ok(Ok(ack)) if ack.queued => {
            send_bridge(sink, "promptQueued", json!({"position": ack.position})).await
        }
        Ok(Ok(_)) => send_bridge(sink, "promptReceived", json!({})).await,
        Ok(Err(e)) => send_bridge(sink, "error", json!({"message": e.to_string()})).await,
        Err(_) => send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await,
    }
}

async fn abort(bound: &Option<Bound>, sink: &mut WsSink) -> Result<(), ()> {
    let Some(bound) = bound else {
        return send_bridge(
            sink,
            "error",
            json!({"message": "no folder selected; client is bound to the lobby"}),
        )
        .await;
    };
    let (tx, rx) = oneshot::channel();
    if bound.sender.send(RuntimeCommand::Abort { reply: tx }).is_err() {
        return send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await;
    }
    match rx.await {
        Ok(Ok(())) => send_bridge(sink, "processExit", json!({"folder": bound.folder})).await,
        Ok(Err(e)) => send_bridge(sink, "error", json!({"message": e.to_string()})).await,
        Err(_) => send_bridge(sink, "error", json!({"message": "runtime has shut down"})).await,
    }
}

async fn delete_folder(
    state: &AppState,
    bound: &mut Option<Bound>,
    folder: String,
    sink: &mut WsSink,
) -> Result<(), ()> {
    let folder_name = FolderName::new(folder);
    let path = match resolve_folder_path(&state.registry.config().scan_root, folder_name.as_str()) {
        Ok(p) => p,
        Err(e) => return send_bridge(sink, "error", json!({"message": e.to_string()})).await,
    };

    if let Some(sender) = state.registry.lookup(&folder_name) {
        let (tx, rx) = oneshot::channel();
        if sender.send(RuntimeCommand::Exit { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }
    if bound.as_ref().is_some_and(|b| b.folder == folder_name) {
        *bound = None;
    }

    match std::fs::remove_dir_all(&path) {
        Ok(()) | Err(_) if !path.exists() => {
            send_bridge(sink, "folderDeleted", json!({"folder": folder_name})).await
        }
        Err(e) => send_bridge(sink, "error", json!({"message": e.to_string()})).await,
    }
}

async fn send_bridge(
    sink: &mut WsSink,
    message_type: &str,
    mut data: Value,
) -> Result<(), ()> {
    if let Value::Object(ref mut map) = data {
        map.insert("source".to_string(), Value::String("bridge".to_string()));
        map.insert("type".to_string(), Value::String(message_type.to_string()));
    }
    sink.send(Message::Text(data.to_string())).await.map_err(|_| ())
}
