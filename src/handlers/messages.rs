//! Edit and delete, bound to the authenticated identity. Changes are pushed
//! to the message's original destinations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::protocol::{MessagePayload, ServerEvent};
use crate::store::MessageStore;
use crate::utils::auth::CurrentUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct MessageIdPath {
    #[serde(deserialize_with = "crate::serde_i64_string::deserialize")]
    message_id: i64,
}

#[derive(Deserialize)]
pub struct UpdateMessageBody {
    content: String,
}

/// PUT /api/messages/{message_id} — Edit a message. Owner-only; the sender
/// is re-checked against the stored row, not taken from the request.
pub async fn put_message(
    CurrentUser(username): CurrentUser,
    State(state): State<AppState>,
    Path(MessageIdPath { message_id }): Path<MessageIdPath>,
    Json(body): Json<UpdateMessageBody>,
) -> Result<Json<MessagePayload>, (StatusCode, &'static str)> {
    if body.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message cannot be empty"));
    }
    if body.content.chars().count() > state.config.max_message_len {
        return Err((StatusCode::BAD_REQUEST, "Message too long"));
    }

    let updated = state
        .store
        .edit(message_id, &body.content, &username)
        .await
        .map_err(|e| e.status())?;

    let payload = MessagePayload::from(updated);
    state.dispatcher.notify(
        &payload.sender,
        payload.receiver.as_deref(),
        &ServerEvent::MessageUpdated(payload.clone()),
    );
    Ok(Json(payload))
}

/// DELETE /api/messages/{message_id} — Delete a message. Owner-only.
pub async fn delete_message(
    CurrentUser(username): CurrentUser,
    State(state): State<AppState>,
    Path(MessageIdPath { message_id }): Path<MessageIdPath>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    let removed = state
        .store
        .delete(message_id, &username)
        .await
        .map_err(|e| e.status())?;

    let payload = MessagePayload::from(removed);
    state.dispatcher.notify(
        &payload.sender,
        payload.receiver.as_deref(),
        &ServerEvent::MessageDeleted(payload.clone()),
    );
    Ok(StatusCode::NO_CONTENT)
}
