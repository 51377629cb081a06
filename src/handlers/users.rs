//! Presence roster endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::identity::PresenceStore;
use crate::protocol::PresencePayload;
use crate::utils::auth::CurrentUser;
use crate::AppState;

/// GET /api/users/online — usernames currently online with last-seen.
pub async fn get_online_users(
    CurrentUser(_username): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PresencePayload>>, (StatusCode, &'static str)> {
    let users = state.identity.online_users().await.map_err(|e| {
        tracing::error!("online users: {e}");
        e.status()
    })?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| PresencePayload {
                username: u.username,
                is_online: u.is_online,
                last_seen: u.last_seen,
            })
            .collect(),
    ))
}
