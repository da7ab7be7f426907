use hrpc_transport::TransportError;
use thiserror::Error;

/// Result type alias for HTTP transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the HTTP transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP exchange failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The owned runtime could not be started.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The response body was not a valid envelope.
    #[error("invalid response envelope (status {status}): {source}")]
    Json {
        /// HTTP status of the response.
        status: u16,
        /// Decoding failure.
        source: serde_json::Error,
    },
}

impl From<Error> for TransportError {
    fn from(error: Error) -> Self {
        let message = error.to_string();
        match error {
            Error::Http(e) if e.is_connect() => Self::ConnectionFailed(message),
            Error::Http(_) => Self::Exchange(message),
            Error::Io(_) => Self::Other(message),
            Error::Json { .. } => Self::Codec(message),
        }
    }
}
