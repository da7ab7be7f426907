//! Error types for transports.

use thiserror::Error;

/// Errors a transport can report to the client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Codec error while encoding a request or decoding a response.
    #[error("codec error: {0}")]
    Codec(String),

    /// The connection is closed (or was never opened).
    #[error("connection closed")]
    ConnectionClosed,

    /// Failed to establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request/response exchange failed.
    #[error("exchange failed: {0}")]
    Exchange(String),

    /// Invalid address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
