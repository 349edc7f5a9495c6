//! Collaborator error types.

use std::time::Duration;
use thiserror::Error;

/// Errors talking to the lease broker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker answered with a non-success status.
    #[error("Broker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("Broker transport error: {0}")]
    Transport(String),

    /// The request did not complete within the timeout.
    #[error("Broker request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body was not the expected shape.
    #[error("Malformed broker response: {0}")]
    Decode(String),
}

impl BrokerError {
    /// Whether the broker itself rejected the request (as opposed to the
    /// request not getting through).
    pub fn is_rejection(&self) -> bool {
        matches!(self, BrokerError::Status { .. })
    }
}

/// Errors decrypting an account payload.
///
/// Kept apart from [`BrokerError`] so a bad key is never mistaken for a
/// network failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptError {
    /// The payload is not valid base64 or is too short to hold a nonce.
    #[error("Invalid payload encoding: {0}")]
    Encoding(String),

    /// Authentication failed: wrong key or tampered payload.
    #[error("Payload authentication failed")]
    Authentication,

    /// The plaintext is not an account envelope.
    #[error("Invalid account payload: {0}")]
    Payload(String),
}

/// Errors polling quota.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaError {
    /// The refresh token could not be exchanged for an access token.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// The quota endpoint answered with a non-success status.
    #[error("Quota endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("Quota transport error: {0}")]
    Transport(String),

    /// The request did not complete within the timeout.
    #[error("Quota request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body was not the expected shape.
    #[error("Malformed quota response: {0}")]
    Decode(String),
}
