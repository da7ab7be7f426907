//! Error types for the RPC client.

use hrpc_transport::{RemoteErrors, TransportError};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The client was used incorrectly.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// No response arrived within the configured bound.
    #[error("rpc timeout on {session_id}/{request_id} (uri: {uri}, method: {method})")]
    Timeout {
        /// Session the request was sent on.
        session_id: String,
        /// Id of the request that timed out.
        request_id: String,
        /// Root uri of the request.
        uri: String,
        /// Rendered invocation path of the request.
        method: String,
    },

    /// A response was expected but came back empty or malformed.
    #[error("protocol error on {session_id}/{request_id}: {message}")]
    Protocol {
        /// Session the request was sent on.
        session_id: String,
        /// Id of the request.
        request_id: String,
        /// What was wrong with the response.
        message: String,
    },

    /// The remote side reported a failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The transport failed to send the request or complete the exchange.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A promise or response callback was dropped before it settled.
    #[error("abandoned before settling")]
    Abandoned,
}

/// Incorrect use of the client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The client is not connected.
    #[error("rpc client not connected, call connect() first")]
    NotConnected,

    /// The proxy was created by a different client.
    #[error("proxy for {uri} was created by another client")]
    ForeignProxy {
        /// Root uri of the proxy.
        uri: String,
    },

    /// A request for this proxy is already in flight.
    #[error("evaluation of {uri}{method} is already in flight")]
    EvaluationPending {
        /// Root uri of the proxy.
        uri: String,
        /// Rendered invocation path of the proxy.
        method: String,
    },
}

/// Application-level failure reported by the remote side, surfaced unmodified.
#[derive(Clone, Debug, Error)]
#[error(
    "{error_type}: {message}\n\n|--   Remote Traceback   --|\n\n{traceback}\n\n|--   Remote Traceback end   --|"
)]
pub struct RemoteError {
    /// Session the request was sent on.
    pub session_id: String,

    /// Id of the failed request.
    pub request_id: String,

    /// Remote exception type.
    pub error_type: String,

    /// Remote exception message.
    pub message: String,

    /// Structured remote stack.
    pub stack: Value,

    /// Formatted remote traceback.
    pub traceback: String,
}

impl RemoteError {
    pub(crate) fn new(session_id: String, request_id: String, errors: RemoteErrors) -> Self {
        Self {
            session_id,
            request_id,
            error_type: errors.error_type,
            message: errors.message,
            stack: errors.stack,
            traceback: errors.tb,
        }
    }
}
