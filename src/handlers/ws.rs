//! WebSocket handler and connection lifecycle: token auth on upgrade,
//! registration + implicit subscriptions, join/leave synthesis, heartbeat,
//! forced disconnect of stalled or silent connections.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dispatch::InboundEvent;
use crate::identity::PresenceStore;
use crate::protocol::{ClientFrame, PresencePayload, ServerEvent};
use crate::registry::{ConnectionEntry, PresenceChange};
use crate::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrades the connection after validating the token query param. An
/// invalid credential closes the connection before it is ever registered.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = q.token else {
        return (axum::http::StatusCode::UNAUTHORIZED, "Missing token query param")
            .into_response();
    };
    let Some(username) = state.tokens.validate(&token) else {
        return (axum::http::StatusCode::UNAUTHORIZED, "Invalid or expired token")
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, username, state))
}

/// Connecting → Active: register, attach implicit subscriptions, flip
/// presence on the first connection, and synthesize the join event.
async fn open_connection(
    state: &AppState,
    username: &str,
) -> (Arc<ConnectionEntry>, mpsc::Receiver<String>) {
    let (entry, rx, change) = state.registry.register(username);
    state.subscriptions.attach(&entry);
    state.metrics.active_connections.inc();
    tracing::info!(username = %username, conn_id = entry.conn_id, "ws connected");

    if change == PresenceChange::CameOnline {
        if let Err(e) = state.identity.set_online(username, true).await {
            tracing::warn!(username = %username, "set_online(true): {e}");
        }
        broadcast_presence(state, username, true, None);
    }
    if let Err(e) = state.dispatcher.submit(InboundEvent::joined(username)).await {
        tracing::warn!(username = %username, "join event: {e}");
    }
    (entry, rx)
}

async fn handle_socket(mut socket: WebSocket, username: String, state: AppState) {
    let (entry, mut rx) = open_connection(&state, &username).await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Forced close: stalled send buffer or heartbeat timeout.
            _ = entry.shutdown.notified() => {
                tracing::debug!(username = %username, conn_id = entry.conn_id, "ws forced close");
                break;
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        entry.touch();
                        if handle_frame(&state, &entry, &mut socket, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        entry.touch();
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        entry.touch();
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    close_connection(&state, &entry).await;
}

/// Process one inbound text frame. `Err` means the socket is broken and the
/// loop should exit; dispatch failures are surfaced to this connection only.
async fn handle_frame(
    state: &AppState,
    entry: &Arc<ConnectionEntry>,
    socket: &mut WebSocket,
    text: &str,
) -> Result<(), ()> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(_) => {
            // Malformed payload: a client error, not a server fault.
            let notice = ServerEvent::system("malformed payload").to_frame();
            return socket
                .send(Message::Text(notice.into()))
                .await
                .map_err(|_| ());
        }
    };

    match frame {
        ClientFrame::Ping => socket
            .send(Message::Text(ServerEvent::Pong.to_frame().into()))
            .await
            .map_err(|_| ()),
        ClientFrame::Chat {
            content,
            receiver,
            chat_room,
        } => {
            let event = InboundEvent::chat(&entry.username, content, receiver, chat_room);
            if let Err(e) = state.dispatcher.submit(event).await {
                let notice = ServerEvent::system(format!("Failed to send message: {e}"));
                // Best effort; a full buffer here will be caught by fan-out.
                let _ = entry.push(&notice.to_frame());
            }
            Ok(())
        }
        ClientFrame::Typing { receiver } => {
            if let Err(e) = state
                .dispatcher
                .submit(InboundEvent::typing(&entry.username, receiver))
                .await
            {
                tracing::debug!(username = %entry.username, "typing event: {e}");
            }
            Ok(())
        }
    }
}

/// Closing → Closed: detach subscriptions, deregister, and on the last
/// connection flip presence and synthesize the leave event. An in-flight
/// dispatch from this connection is unaffected; the entry only disappears
/// from future resolutions.
async fn close_connection(state: &AppState, entry: &Arc<ConnectionEntry>) {
    let username = entry.username.clone();
    state.subscriptions.detach(entry);
    let change = state.registry.deregister(entry);
    state.metrics.active_connections.dec();
    tracing::info!(username = %username, conn_id = entry.conn_id, "ws disconnected");

    if change == PresenceChange::WentOffline {
        let now = Utc::now();
        if let Err(e) = state.identity.set_online(&username, false).await {
            tracing::warn!(username = %username, "set_online(false): {e}");
        }
        if let Err(e) = state.identity.set_last_seen(&username, now).await {
            tracing::warn!(username = %username, "set_last_seen: {e}");
        }
        if let Err(e) = state.dispatcher.submit(InboundEvent::left(&username)).await {
            tracing::warn!(username = %username, "leave event: {e}");
        }
        broadcast_presence(state, &username, false, Some(now));
    }
}

fn broadcast_presence(
    state: &AppState,
    username: &str,
    is_online: bool,
    last_seen: Option<chrono::DateTime<Utc>>,
) {
    let event = ServerEvent::Presence(PresencePayload {
        username: username.to_string(),
        is_online,
        last_seen,
    });
    state.dispatcher.notify(username, None, &event);
}

/// Background sweep: force-close connections with no inbound frame inside
/// the heartbeat window. Teardown runs on the owning socket task, so the
/// normal deregistration path (presence, leave event) applies.
pub fn spawn_stale_connection_sweep(state: AppState) -> tokio::task::JoinHandle<()> {
    let interval = std::time::Duration::from_secs(state.config.prune_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_stale(&state);
        }
    })
}

fn sweep_stale(state: &AppState) {
    for entry in state
        .registry
        .stale_connections(state.config.heartbeat_timeout_secs)
    {
        tracing::info!(
            username = %entry.username,
            conn_id = entry.conn_id,
            "heartbeat timeout, forcing disconnect"
        );
        entry.shutdown.notify_one();
    }
}
