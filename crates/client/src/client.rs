//! RPC client implementation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hrpc_transport::{Request, Response, ResponseSink, SharedSink, Transport, TransportError};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::correlation::{Correlator, Delivery};
use crate::error::{Error, RemoteError, Result, UsageError};
use crate::promise::Promise;
use crate::proxy::{Begin, Outcome, RemoteObjectProxy};

/// Callback receiving the outcome of a callback-mode evaluation.
pub type OnResponse = Box<dyn FnOnce(Result<Outcome>) + Send + 'static>;

/// Options for [`RpcClient::evaluate_with`].
pub struct EvaluateOptions<'a> {
    /// Whether a response is expected. Without a callback, `false` means
    /// fire-and-forget: the request is sent with an empty id and nothing waits.
    pub wait_for_response: bool,
    /// Receives a copy of the raw response on the blocking path.
    pub out_response: Option<&'a mut Option<Response>>,
    /// Evaluate without blocking; the outcome is passed here when it arrives.
    pub on_response: Option<OnResponse>,
}

impl<'a> EvaluateOptions<'a> {
    /// Blocking evaluation, the default.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wait_for_response: true,
            out_response: None,
            on_response: None,
        }
    }

    /// Do not wait for a response.
    #[must_use]
    pub const fn no_wait(mut self) -> Self {
        self.wait_for_response = false;
        self
    }

    /// Copy the raw response into `slot`.
    #[must_use]
    pub fn out_response(mut self, slot: &'a mut Option<Response>) -> Self {
        self.out_response = Some(slot);
        self
    }

    /// Deliver the outcome to `callback` instead of blocking.
    #[must_use]
    pub fn on_response<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<Outcome>) + Send + 'static,
    {
        self.on_response = Some(Box::new(callback));
        self
    }
}

impl Default for EvaluateOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating RPC clients.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default bound for blocking evaluations.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set whether the transport is connected on build.
    #[must_use]
    pub const fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.config.auto_connect = auto_connect;
        self
    }

    /// Set how long orphaned responses and timed-out ids are retained, and how
    /// long a callback evaluation waits before it fails with [`Error::Timeout`].
    #[must_use]
    pub const fn orphan_ttl(mut self, ttl: Duration) -> Self {
        self.config.orphan_ttl = ttl;
        self
    }

    /// Build the client around the transport returned by `transport`, which
    /// receives the sink it must deliver responses to.
    ///
    /// # Errors
    ///
    /// Returns an error if auto-connect is enabled and connecting fails.
    pub fn build<T, F>(self, transport: F) -> Result<RpcClient<T>>
    where
        T: Transport,
        F: FnOnce(SharedSink) -> T,
    {
        self.try_build(|sink| Ok::<_, TransportError>(transport(sink)))
    }

    /// Like [`ClientBuilder::build`] for transports whose construction can fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed, or if
    /// auto-connect is enabled and connecting fails.
    pub fn try_build<T, E, F>(self, transport: F) -> Result<RpcClient<T>>
    where
        T: Transport,
        E: Into<TransportError>,
        F: FnOnce(SharedSink) -> std::result::Result<T, E>,
    {
        let correlator = Arc::new(Correlator::new(self.config.orphan_ttl));
        let sink: SharedSink = correlator.clone();
        let transport = transport(sink).map_err(|e| Error::Transport(e.into()))?;

        let client = RpcClient {
            id: Uuid::new_v4(),
            transport,
            correlator,
            timeout: RwLock::new(self.config.timeout),
            evaluated_count: AtomicUsize::new(0),
        };

        if self.config.auto_connect {
            client.connect()?;
        }

        Ok(client)
    }
}

/// RPC client: owns the transport and evaluates proxies against it.
///
/// Shareable across threads; wrap it in an `Arc` to evaluate from many call
/// sites at once.
pub struct RpcClient<T: Transport> {
    id: Uuid,
    transport: T,
    correlator: Arc<Correlator>,
    timeout: RwLock<Duration>,
    evaluated_count: AtomicUsize,
}

impl<T: Transport> RpcClient<T> {
    /// Connect the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to connect.
    pub fn connect(&self) -> Result<()> {
        info!("Connecting session {}", self.transport.session_id());
        self.transport.connect().map_err(Error::from)
    }

    /// Disconnect the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to disconnect.
    pub fn disconnect(&self) -> Result<()> {
        info!("Disconnecting session {}", self.transport.session_id());
        self.transport.disconnect().map_err(Error::from)
    }

    /// Whether the transport reports itself connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Session id of the transport.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.transport.session_id()
    }

    /// A fresh, unevaluated proxy for `uri`. No I/O.
    #[must_use]
    pub fn remote(&self, uri: impl Into<String>) -> RemoteObjectProxy {
        RemoteObjectProxy::root(self.id, uri)
    }

    /// Evaluate `proxy`, blocking until its response arrives or the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the client is disconnected, the proxy
    /// belongs to another client or is already being evaluated;
    /// [`Error::Timeout`], [`Error::Remote`], [`Error::Protocol`] or
    /// [`Error::Transport`] if the exchange fails.
    pub fn evaluate(&self, proxy: &RemoteObjectProxy) -> Result<Outcome> {
        self.check(proxy)?;
        match self.begin(proxy)? {
            Some(outcome) => Ok(outcome),
            None => self.evaluate_blocking(proxy, None),
        }
    }

    /// Evaluate `proxy` with explicit options.
    ///
    /// Returns `Ok(None)` when no outcome is available synchronously: in
    /// callback mode (the callback receives it later) and in fire-and-forget mode.
    ///
    /// # Errors
    ///
    /// As [`RpcClient::evaluate`]. In callback mode only errors raised before
    /// the request is sent are returned here; the rest go to the callback.
    #[instrument(skip(self, proxy, options), fields(uri = %proxy.uri(), method = %proxy.invocation_path()))]
    pub fn evaluate_with(
        &self,
        proxy: &RemoteObjectProxy,
        options: EvaluateOptions<'_>,
    ) -> Result<Option<Outcome>> {
        self.check(proxy)?;
        if let Some(outcome) = self.begin(proxy)? {
            return Ok(Some(outcome));
        }

        let EvaluateOptions {
            wait_for_response,
            out_response,
            on_response,
        } = options;

        match on_response {
            Some(on_response) => self.evaluate_callback(proxy, on_response).map(|()| None),
            None if wait_for_response => self.evaluate_blocking(proxy, out_response).map(Some),
            None => self.evaluate_detached(proxy).map(|()| None),
        }
    }

    /// Evaluate `proxy` without blocking.
    ///
    /// The promise settles with the intermediate proxy or the concrete result,
    /// and rejects with any error, including ones raised before sending.
    pub fn resolve(&self, proxy: &RemoteObjectProxy) -> Promise<Outcome> {
        Promise::new(|settle| {
            let callback = settle.clone();
            let options = EvaluateOptions::new().on_response(move |outcome| {
                callback.settle(outcome);
            });

            match self.evaluate_with(proxy, options) {
                Ok(Some(outcome)) => {
                    settle.resolve(outcome);
                }
                Ok(None) => {}
                Err(err) => {
                    settle.reject(err);
                }
            }
        })
    }

    /// Call `method(args)` on `proxy` and evaluate it without blocking.
    ///
    /// Settles exactly like [`RpcClient::resolve`].
    pub fn invoke<I>(&self, proxy: &RemoteObjectProxy, method: &str, args: I) -> Promise<Outcome>
    where
        I: IntoIterator<Item = Value>,
    {
        self.resolve(&proxy.call(method, args))
    }

    /// Deliver a response as the transport would.
    pub fn put_response(&self, response: Response) {
        self.correlator.put_response(response);
    }

    /// Pop the buffered response for `request_id`, if any.
    #[must_use]
    pub fn get_response(&self, request_id: &str) -> Option<Response> {
        self.correlator.get_response(request_id)
    }

    /// Set the bound for future blocking evaluations.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    /// The bound for blocking evaluations.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    /// Number of evaluations that sent a request since creation or the last reset.
    #[must_use]
    pub fn evaluation_count(&self) -> usize {
        self.evaluated_count.load(Ordering::Relaxed)
    }

    /// Reset [`RpcClient::evaluation_count`] to zero.
    pub fn reset_evaluation_counter(&self) {
        self.evaluated_count.store(0, Ordering::Relaxed);
    }

    /// Requests waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_len()
    }

    /// Responses delivered but not yet claimed.
    #[must_use]
    pub fn buffered_responses(&self) -> usize {
        self.correlator.buffered_len()
    }

    fn check(&self, proxy: &RemoteObjectProxy) -> Result<()> {
        if proxy.client_id() != self.id {
            return Err(UsageError::ForeignProxy {
                uri: proxy.uri().to_string(),
            }
            .into());
        }
        if !self.connected() {
            return Err(UsageError::NotConnected.into());
        }
        Ok(())
    }

    /// `Some` when the proxy is already evaluated; `None` when the caller now owns
    /// the evaluation.
    fn begin(&self, proxy: &RemoteObjectProxy) -> Result<Option<Outcome>> {
        match proxy.begin() {
            Begin::Cached(outcome) => {
                debug!("Proxy {} already evaluated", proxy.uri());
                Ok(Some(outcome))
            }
            Begin::Pending => Err(UsageError::EvaluationPending {
                uri: proxy.uri().to_string(),
                method: proxy.invocation_path().to_string(),
            }
            .into()),
            Begin::Started => {
                self.evaluated_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn evaluate_blocking(
        &self,
        proxy: &RemoteObjectProxy,
        out_response: Option<&mut Option<Response>>,
    ) -> Result<Outcome> {
        let request_id = Uuid::new_v4().to_string();
        let signal = self.correlator.register_signal(&request_id);

        if let Err(err) = self.send(proxy, &request_id) {
            self.correlator.unregister(&request_id);
            proxy.reset();
            return Err(err.into());
        }

        let timeout = self.timeout();
        let delivery = if signal.recv_timeout(timeout).is_ok() {
            self.correlator.take(&request_id)
        } else if let Some(delivery) = self.correlator.abandon(&request_id) {
            Some(delivery)
        } else {
            proxy.reset();
            warn!(
                "Request {} timed out after {:?} ({}{})",
                request_id,
                timeout,
                proxy.uri(),
                proxy.invocation_path()
            );
            return Err(Error::Timeout {
                session_id: self.session_id().to_string(),
                request_id,
                uri: proxy.uri().to_string(),
                method: proxy.invocation_path().to_string(),
            });
        };

        if let (Some(slot), Some(Ok(response))) = (out_response, delivery.as_ref()) {
            *slot = Some(response.clone());
        }

        ResponseContext {
            client_id: self.id,
            session_id: self.session_id().to_string(),
            request_id,
            proxy: proxy.clone(),
        }
        .complete(delivery)
    }

    fn evaluate_callback(&self, proxy: &RemoteObjectProxy, on_response: OnResponse) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        let context = ResponseContext {
            client_id: self.id,
            session_id: self.session_id().to_string(),
            request_id: request_id.clone(),
            proxy: proxy.clone(),
        };

        self.correlator.register_callback(
            &request_id,
            Box::new(move |delivery: Option<Delivery>| {
                on_response(match delivery {
                    Some(delivery) => context.complete(Some(delivery)),
                    None => Err(context.expire()),
                });
            }),
        );

        if let Err(err) = self.send(proxy, &request_id) {
            self.correlator.unregister(&request_id);
            proxy.reset();
            return Err(err.into());
        }

        Ok(())
    }

    fn evaluate_detached(&self, proxy: &RemoteObjectProxy) -> Result<()> {
        if let Err(err) = self.send(proxy, "") {
            proxy.reset();
            return Err(err.into());
        }

        proxy.finish(None, None);
        Ok(())
    }

    fn send(
        &self,
        proxy: &RemoteObjectProxy,
        request_id: &str,
    ) -> std::result::Result<(), TransportError> {
        debug!(
            "Sending request {} for {}{}",
            request_id,
            proxy.uri(),
            proxy.invocation_path()
        );

        self.transport.send(Request {
            id: request_id.to_string(),
            uri: proxy.uri().to_string(),
            method: proxy.invocation_path().clone(),
            session_id: None,
        })
    }
}

impl<T: Transport> fmt::Debug for RpcClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("id", &self.id)
            .field("session_id", &self.transport.session_id())
            .field("connected", &self.connected())
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

/// Everything needed to turn a delivery into an outcome, off the client.
struct ResponseContext {
    client_id: Uuid,
    session_id: String,
    request_id: String,
    proxy: RemoteObjectProxy,
}

impl ResponseContext {
    fn complete(self, delivery: Option<Delivery>) -> Result<Outcome> {
        let proxy = self.proxy.clone();
        let result = self.handle(delivery);
        if result.is_err() {
            proxy.reset();
        }
        result
    }

    fn handle(self, delivery: Option<Delivery>) -> Result<Outcome> {
        let mut response = match delivery {
            Some(Ok(response)) => response,
            Some(Err(err)) => return Err(err.into()),
            None => return Err(self.protocol_error("remote responded nothing")),
        };

        if let Some(errors) = response.errors.take() {
            let session_id = response.session_id.unwrap_or(self.session_id);
            return Err(RemoteError::new(session_id, self.request_id, errors).into());
        }

        if response.is_empty() {
            return Err(self.protocol_error("response carries neither a result nor a uri"));
        }

        let uri = response.intermediate_uri().map(str::to_string);
        let value = response.result.unwrap_or(Value::Null);
        let intermediate =
            uri.map(|uri| RemoteObjectProxy::intermediate(self.client_id, uri, value.clone()));

        debug!(
            "Request {} resolved{}",
            self.request_id,
            if intermediate.is_some() {
                " to a remote object"
            } else {
                ""
            }
        );

        Ok(self.proxy.finish(Some(value), intermediate))
    }

    /// Give up on a callback that never got its response.
    fn expire(self) -> Error {
        self.proxy.reset();
        Error::Timeout {
            session_id: self.session_id,
            request_id: self.request_id,
            uri: self.proxy.uri().to_string(),
            method: self.proxy.invocation_path().to_string(),
        }
    }

    fn protocol_error(&self, message: &str) -> Error {
        Error::Protocol {
            session_id: self.session_id.clone(),
            request_id: self.request_id.clone(),
            message: message.to_string(),
        }
    }
}
