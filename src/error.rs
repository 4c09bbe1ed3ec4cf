//! Typed errors at the edges of the service.
//!
//! Only [`RequestError`] ever reaches a caller. Generation failures are
//! defined next to the adapter in [`crate::generation`] and are always
//! absorbed by the engine.

use thiserror::Error;

/// Inbound request rejected before reaching the engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("Invalid recipientId: {0}")]
    InvalidRecipient(String),
}

impl RequestError {
    /// Machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Malformed(_) => "bad_request",
            RequestError::InvalidRecipient(_) => "invalid_recipient",
        }
    }
}
