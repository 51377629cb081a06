//! History endpoints: request/response retrieval returning the same message
//! shape the WebSocket pushes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::identity::PresenceStore;
use crate::protocol::MessagePayload;
use crate::store::MessageStore;
use crate::utils::auth::CurrentUser;
use crate::{AppState, MAX_MESSAGES_LIMIT};

#[derive(Deserialize)]
pub struct RoomPath {
    room: String,
}

/// GET /api/messages/room/{room} — room history, ascending.
pub async fn get_room_messages(
    CurrentUser(_username): CurrentUser,
    State(state): State<AppState>,
    Path(RoomPath { room }): Path<RoomPath>,
) -> Result<Json<Vec<MessagePayload>>, (StatusCode, &'static str)> {
    let rows = state.store.room_history(&room, None).await.map_err(|e| {
        tracing::error!("room history: {e}");
        e.status()
    })?;
    Ok(Json(rows.into_iter().map(MessagePayload::from).collect()))
}

#[derive(Deserialize)]
pub struct PrivateHistoryQuery {
    with: String,
}

/// GET /api/messages/private?with=bob — pair history between the
/// authenticated user and `with`, either direction, ascending. The first
/// participant is always the caller's own identity.
pub async fn get_private_messages(
    CurrentUser(username): CurrentUser,
    State(state): State<AppState>,
    Query(q): Query<PrivateHistoryQuery>,
) -> Result<Json<Vec<MessagePayload>>, (StatusCode, &'static str)> {
    let peer_known = state.identity.exists(&q.with).await.map_err(|e| {
        tracing::error!("peer lookup: {e}");
        e.status()
    })?;
    if !peer_known {
        return Err((StatusCode::NOT_FOUND, "User not found"));
    }

    let rows = state
        .store
        .private_history(&username, &q.with)
        .await
        .map_err(|e| {
            tracing::error!("private history: {e}");
            e.status()
        })?;
    Ok(Json(rows.into_iter().map(MessagePayload::from).collect()))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// GET /api/messages/recent?limit=50 — newest N public-room messages,
/// returned ascending. Private messages are never included here.
pub async fn get_recent_messages(
    CurrentUser(_username): CurrentUser,
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<MessagePayload>>, (StatusCode, &'static str)> {
    let limit = q.limit.unwrap_or(50).clamp(1, MAX_MESSAGES_LIMIT);
    let rows = state
        .store
        .room_history("public", Some(limit))
        .await
        .map_err(|e| {
            tracing::error!("recent messages: {e}");
            e.status()
        })?;
    Ok(Json(rows.into_iter().map(MessagePayload::from).collect()))
}
