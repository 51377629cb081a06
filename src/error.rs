//! Core error taxonomy. Everything here is recoverable at the scope of one
//! connection or one event; there is no fatal variant.

use axum::http::StatusCode;

/// Failures from the message store gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sender not found: {0}")]
    UnknownSender(String),
    #[error("receiver not found: {0}")]
    UnknownReceiver(String),
    #[error("message not found")]
    NotFound,
    #[error("you can only modify your own messages")]
    NotOwner,
    #[error("store operation timed out")]
    Timeout,
    #[error("id generation failed")]
    IdGeneration,
    #[error("database error")]
    Database(#[from] diesel::result::Error),
    #[error("database connection failed")]
    Connection,
    #[error("internal store failure")]
    Internal,
}

/// Failures from the dispatch engine. Validation and identity resolution
/// errors are surfaced to the originating connection only, as system
/// messages; they are not server faults.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StoreError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            StoreError::UnknownSender(_) => (StatusCode::BAD_REQUEST, "Sender not found"),
            StoreError::UnknownReceiver(_) => (StatusCode::BAD_REQUEST, "Receiver not found"),
            StoreError::NotFound => (StatusCode::NOT_FOUND, "Message not found"),
            StoreError::NotOwner => {
                (StatusCode::FORBIDDEN, "You can only modify your own messages")
            }
            StoreError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "Store timed out, retry"),
            StoreError::IdGeneration => (StatusCode::INTERNAL_SERVER_ERROR, "ID generation failed"),
            StoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            StoreError::Connection => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed")
            }
            StoreError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        }
    }
}
