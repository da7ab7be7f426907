//! Lazy remote-object RPC client.
//!
//! Remote objects are addressed by uri. A [`RemoteObjectProxy`] records the
//! attribute accesses, calls and subscripts applied to a remote object without
//! touching the network; evaluating it sends the whole invocation path in a
//! single request and returns either a concrete value or a proxy for another
//! remote object.
//!
//! # Features
//!
//! - **Lazy chaining**: build arbitrarily long invocation paths offline
//! - **Evaluation modes**: blocking with timeout, callback, promise and fire-and-forget
//! - **Pluggable transports**: anything implementing [`Transport`]
//! - **Concurrent use**: one client may be shared across threads
//!
//! # Example
//!
//! ```no_run
//! use hrpc_client::{ClientBuilder, Outcome, Request, Response};
//! use hrpc_transport_memory::MemoryTransport;
//! use serde_json::json;
//!
//! fn example() -> hrpc_client::Result<()> {
//!     let client = ClientBuilder::new().build(|sink| {
//!         MemoryTransport::new(
//!             |request: &Request| Some(Response::value(request.id.clone(), json!(3))),
//!             sink,
//!         )
//!     })?;
//!
//!     let calc = client.remote("obj://42");
//!     let sum = client.evaluate(&calc.call("add", [json!(1), json!(2)]))?;
//!
//!     assert_eq!(sum, Outcome::Value(json!(3)));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
mod correlation;
pub mod error;
pub mod promise;
pub mod proxy;

// Re-export commonly used types
pub use client::{ClientBuilder, EvaluateOptions, OnResponse, RpcClient};
pub use config::ClientConfig;
pub use error::{Error, RemoteError, Result, UsageError};
pub use promise::{Promise, Settle};
pub use proxy::{Outcome, RemoteObjectProxy};

// Re-export transport types that are part of our public API
pub use hrpc_transport::{
    Invocation, InvocationPath, RemoteErrors, Request, Response, ResponseSink, SharedSink,
    Transport, TransportError,
};
