//! WebSocket sync relay for the single room this process serves.
//!
//! A connection introduces itself with `hello`, gets back `welcome` with a
//! full store snapshot and the current peer list, then exchanges `sync` and
//! `presence` frames. Sync bytes are merged into the server store before
//! rebroadcast so late joiners and the automation engine see every edit;
//! presence frames are relayed untouched and never reach the store.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tandem_core::presence::color_for_index;
use tandem_core::protocol::{decode_update, encode_update, ClientMessage, ServerMessage};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize a server message into a text frame. Serialization of these
/// types cannot realistically fail; if it somehow does, drop the frame
/// instead of tearing down the connection.
fn frame(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            warn!("Failed to encode frame: {}", err);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4().to_string();
    info!("New connection: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();

    // The first text frame must be hello.
    let mut user = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Hello { user }) => break user,
                    Ok(_) | Err(_) => {
                        warn!("Connection {} spoke before hello", connection_id);
                        let err = ServerMessage::Error {
                            message: "expected a hello frame first".to_string(),
                        };
                        if let Some(f) = frame(&err) {
                            let _ = sender.send(f).await;
                        }
                        return;
                    }
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        }
    };

    if user.color.is_empty() {
        user.color = color_for_index(state.peers.len()).to_string();
    }

    let snapshot = match state.store.lock().await.snapshot_bytes() {
        Ok(bytes) => encode_update(&bytes),
        Err(err) => {
            warn!("Snapshot export failed for {}: {}", connection_id, err);
            let msg = ServerMessage::Error {
                message: "could not export the room snapshot".to_string(),
            };
            if let Some(f) = frame(&msg) {
                let _ = sender.send(f).await;
            }
            return;
        }
    };

    // Subscribe before announcing ourselves so no frame lands in the gap.
    let mut rx = state.tx.subscribe();
    let peers = state.peer_list();
    state.peers.insert(connection_id.clone(), user.clone());

    let welcome = ServerMessage::Welcome {
        connection_id: connection_id.clone(),
        room: state.room.clone(),
        snapshot,
        peers,
    };
    if let Some(f) = frame(&welcome) {
        if sender.send(f).await.is_err() {
            state.peers.remove(&connection_id);
            return;
        }
    }

    state.broadcast(
        &connection_id,
        ServerMessage::PeerJoined {
            connection_id: connection_id.clone(),
            user: user.clone(),
        },
    );
    info!("Peer {} ({}) joined room {}", connection_id, user.name, state.room);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Hello { .. }) => {
                                warn!("Duplicate hello from {}", connection_id);
                            }
                            Ok(ClientMessage::Sync { data }) => {
                                let Some(bytes) = decode_update(&data) else {
                                    let msg = ServerMessage::Error {
                                        message: "sync data is not valid base64".to_string(),
                                    };
                                    if let Some(f) = frame(&msg) {
                                        if sender.send(f).await.is_err() {
                                            break;
                                        }
                                    }
                                    continue;
                                };
                                let merged = state.store.lock().await.merge(&bytes);
                                match merged {
                                    Ok(_) => {
                                        state.broadcast(&connection_id, ServerMessage::Sync {
                                            from: connection_id.clone(),
                                            data,
                                        });
                                    }
                                    Err(err) => {
                                        warn!("Bad update from {}: {}", connection_id, err);
                                        let msg = ServerMessage::Error {
                                            message: format!("update rejected: {err}"),
                                        };
                                        if let Some(f) = frame(&msg) {
                                            if sender.send(f).await.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                }
                            }
                            Ok(ClientMessage::Presence { record }) => {
                                state.broadcast(&connection_id, ServerMessage::Presence {
                                    from: connection_id.clone(),
                                    record,
                                });
                            }
                            Ok(ClientMessage::Bye) => break,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", connection_id, e);
                                let msg = ServerMessage::Error {
                                    message: format!("Invalid message: {e}"),
                                };
                                if let Some(f) = frame(&msg) {
                                    if sender.send(f).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        // Raw store bytes without the JSON envelope.
                        let merged = state.store.lock().await.merge(&payload);
                        match merged {
                            Ok(_) => {
                                state.broadcast(&connection_id, ServerMessage::Sync {
                                    from: connection_id.clone(),
                                    data: encode_update(&payload),
                                });
                            }
                            Err(err) => {
                                warn!("Bad binary update from {}: {}", connection_id, err);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }

            msg = rx.recv() => {
                match msg {
                    Ok((from, server_msg)) => {
                        // Don't echo back to sender
                        if from != connection_id {
                            if let Some(f) = frame(&server_msg) {
                                if sender.send(f).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Connection {} lagged, {} frames dropped", connection_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.peers.remove(&connection_id);
    state.broadcast(
        &connection_id,
        ServerMessage::PeerLeft {
            connection_id: connection_id.clone(),
        },
    );
    info!("Connection closed: {}", connection_id);
}
