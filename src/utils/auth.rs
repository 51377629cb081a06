//! Credential service boundary: JWT issue/validate plus the extractor that
//! binds REST requests to the authenticated identity. Edit, delete and
//! private-history requests always use this identity, never a
//! client-supplied username parameter.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, expiry_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_secs,
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = crate::registry::now_secs();
        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp: now + self.expiry_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Returns the username for a valid, unexpired token; `None` otherwise.
    pub fn validate(&self, token: &str) -> Option<String> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .ok()
            .map(|data| data.claims.sub)
    }
}

/// Extracts the authenticated username from an `Authorization: Bearer` header.
pub struct CurrentUser(pub String);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token"))?;
        match state.tokens.validate(token) {
            Some(username) => Ok(CurrentUser(username)),
            None => Err((StatusCode::UNAUTHORIZED, "Invalid or expired token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_validate_round_trip() {
        let svc = TokenService::new("test-secret", 3600);
        let token = svc.issue("alice").unwrap();
        assert_eq!(svc.validate(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let svc = TokenService::new("test-secret", 3600);
        assert!(svc.validate("not-a-jwt").is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = TokenService::new("secret-a", 3600);
        let verifier = TokenService::new("secret-b", 3600);
        let token = issuer.issue("alice").unwrap();
        assert!(verifier.validate(&token).is_none());
    }
}
