//! Token issuance glue. Credential verification proper (passwords, OAuth)
//! belongs to the external credential service; this endpoint provisions the
//! identity row and mints a JWT for it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::identity::PresenceStore;
use crate::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    username: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    token: String,
    username: String,
}

fn valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (1..=32).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// POST /api/auth/token — issue a bearer token for a username.
pub async fn post_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, &'static str)> {
    if !valid_username(&body.username) {
        return Err((StatusCode::BAD_REQUEST, "Invalid username"));
    }

    state.identity.ensure_user(&body.username).await.map_err(|e| {
        tracing::error!("ensure user: {e}");
        e.status()
    })?;

    let token = state.tokens.issue(&body.username).map_err(|e| {
        tracing::error!("issue token: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Token issuance failed")
    })?;

    Ok(Json(TokenResponse {
        token,
        username: body.username,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(valid_username("alice"));
        assert!(valid_username("bob_2"));
        assert!(valid_username("a-b"));
        assert!(!valid_username(""));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"x".repeat(33)));
    }
}
