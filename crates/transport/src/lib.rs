//! Generic transport abstraction for the lazy remote-object RPC client
//!
//! This crate provides the transport-agnostic interface the client talks to.
//! Specific transport implementations (memory, HTTP, etc.) are provided in separate crates.
//!
//! Transports handle:
//! - Stamping the session id onto outgoing request envelopes
//! - Performing one request/response exchange per request
//! - Decoding the response envelope
//! - Handing the decoded response back through a [`ResponseSink`]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod envelope;
pub mod error;
pub mod path;

use std::sync::Arc;

pub use envelope::{RemoteErrors, Request, Response};
pub use error::TransportError;
pub use error::TransportError as Error;
pub use path::{Invocation, InvocationPath};

/// Entry point transports deliver decoded responses to.
///
/// The client owns the only implementation; transports receive it as a
/// [`SharedSink`] when they are constructed.
pub trait ResponseSink: Send + Sync + 'static {
    /// Deliver a decoded response envelope.
    ///
    /// Must be safe to call from any thread, concurrently with itself.
    fn put_response(&self, response: Response);

    /// Report that the exchange for `request_id` failed after `send` returned.
    fn fail_request(&self, request_id: &str, error: TransportError);
}

/// Shared handle to a response sink.
pub type SharedSink = Arc<dyn ResponseSink>;

/// Transport trait for sending request envelopes
///
/// Transports handle:
/// - Connection state (connect/disconnect)
/// - One logical send per request envelope
/// - Delivering exactly one response per request with a non-empty id
#[allow(clippy::missing_errors_doc)]
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection.
    fn connect(&self) -> Result<(), TransportError>;

    /// Tear the connection down.
    fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Stable identifier of the current connection.
    fn session_id(&self) -> &str;

    /// Send a request envelope
    ///
    /// The transport will:
    /// 1. Stamp its session id onto the envelope
    /// 2. Perform the exchange (possibly on another thread)
    /// 3. Deliver the response to its sink with [`ResponseSink::put_response`],
    ///    or report failure with [`ResponseSink::fail_request`]
    ///
    /// Requests with an empty id expect no response and nothing is delivered for them.
    fn send(&self, request: Request) -> Result<(), TransportError>;
}
