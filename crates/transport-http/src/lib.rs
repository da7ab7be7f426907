//! HTTP transport for the lazy remote-object RPC client.
//!
//! Every request envelope is POSTed as JSON to a single endpoint and the JSON
//! body of the reply is decoded as the response envelope. Exchanges run on a
//! tokio runtime, either one supplied by the caller or one the transport owns,
//! so `send` never blocks the evaluating thread.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use error::{Error, Result};

use hrpc_transport::{Request, Response, SharedSink, Transport, TransportError};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Default bound for one HTTP exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for HTTP transport
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// URL every envelope is POSTed to
    pub endpoint: Url,

    /// Bound for one HTTP exchange
    pub request_timeout: Duration,

    /// Runtime to run exchanges on. When `None` the transport starts its own.
    pub runtime: Option<Handle>,
}

impl HttpOptions {
    /// Options for `endpoint` with the default request timeout and an owned runtime.
    #[must_use]
    pub const fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            runtime: None,
        }
    }
}

/// HTTP transport implementation
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    session_id: String,
    connected: AtomicBool,
    sink: SharedSink,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl HttpTransport {
    /// Create a new HTTP transport delivering responses to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the owned runtime cannot be built.
    pub fn new(options: HttpOptions, sink: SharedSink) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        let (handle, runtime) = match options.runtime {
            Some(handle) => (handle, None),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("hrpc-http")
                    .enable_all()
                    .build()?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let session_id = Uuid::new_v4().to_string();
        info!(
            "HTTP transport {} targeting {}",
            session_id, options.endpoint
        );

        Ok(Self {
            client,
            endpoint: options.endpoint,
            session_id,
            connected: AtomicBool::new(true),
            sink,
            handle,
            runtime,
        })
    }

    /// The endpoint requests are POSTed to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether the endpoint answers an empty POST within one second.
    ///
    /// Blocks the current thread; must not be called from inside an async runtime.
    pub fn ping(&self) -> bool {
        let request = self
            .client
            .post(self.endpoint.clone())
            .timeout(PING_TIMEOUT)
            .send();

        match self.handle.block_on(request) {
            Ok(response) => {
                debug!("Ping {} answered with {}", self.endpoint, response.status());
                true
            }
            Err(e) => {
                debug!("Ping {} failed: {}", self.endpoint, e);
                false
            }
        }
    }
}

async fn exchange(client: &Client, endpoint: Url, body: Vec<u8>) -> Result<Response> {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    // Failed statuses may still carry an error envelope, so decode regardless.
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Json { status, source })
}

impl Transport for HttpTransport {
    fn connect(&self) -> std::result::Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> std::result::Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, mut request: Request) -> std::result::Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        request.session_id = Some(self.session_id.clone());
        let body = serde_json::to_vec(&request)?;

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let sink = Arc::clone(&self.sink);
        let request_id = request.id;

        debug!("POST {} for request {:?}", endpoint, request_id);

        self.handle.spawn(async move {
            match exchange(&client, endpoint, body).await {
                Ok(_) if request_id.is_empty() => {}
                Ok(mut response) => {
                    if response.id.is_empty() {
                        response.id = request_id;
                    }
                    sink.put_response(response);
                }
                Err(e) => {
                    warn!("Exchange for request {:?} failed: {}", request_id, e);
                    if !request_id.is_empty() {
                        sink.fail_request(&request_id, e.into());
                    }
                }
            }
        });

        Ok(())
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("owns_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hrpc_transport::ResponseSink;

    struct NullSink;

    impl ResponseSink for NullSink {
        fn put_response(&self, _response: Response) {}

        fn fail_request(&self, _request_id: &str, _error: TransportError) {}
    }

    fn transport() -> HttpTransport {
        let endpoint = Url::parse("http://127.0.0.1:9/").unwrap();
        HttpTransport::new(HttpOptions::new(endpoint), Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn test_options_default_timeout() {
        let options = HttpOptions::new(Url::parse("http://localhost:8000/").unwrap());

        assert_eq!(options.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(options.runtime.is_none());
    }

    #[test]
    fn test_connected_on_construction() {
        let transport = transport();

        assert!(transport.is_connected());
        assert!(!transport.session_id().is_empty());

        transport.disconnect().unwrap();
        assert!(!transport.is_connected());

        transport.connect().unwrap();
        assert!(transport.is_connected());
    }

    #[test]
    fn test_send_while_disconnected() {
        let transport = transport();
        transport.disconnect().unwrap();

        let request = Request {
            id: "a".to_string(),
            uri: "obj://1".to_string(),
            method: hrpc_transport::InvocationPath::default(),
            session_id: None,
        };

        assert!(matches!(
            transport.send(request),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
