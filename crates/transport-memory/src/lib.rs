//! In-memory transport implementation for testing
//!
//! Requests are handed to a pool of worker threads inside the same process.
//! Each worker asks a [`Dispatcher`] for the response and delivers it to the
//! client's sink, so responses arrive on a different thread than the one that
//! sent the request, just as they would over a network.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hrpc_transport::{Request, Response, SharedSink, Transport, TransportError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Produces the response for a request, or `None` to never answer it.
pub trait Dispatcher: Send + Sync + 'static {
    /// Handle one request.
    fn dispatch(&self, request: &Request) -> Option<Response>;
}

impl<F> Dispatcher for F
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    fn dispatch(&self, request: &Request) -> Option<Response> {
        self(request)
    }
}

/// Configuration for memory transport
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Number of delivery threads
    pub workers: usize,
    /// Delay before each response is delivered
    pub latency: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            latency: Duration::ZERO,
        }
    }
}

/// Memory transport implementation
pub struct MemoryTransport {
    session_id: String,
    connected: AtomicBool,
    sender: Mutex<Option<flume::Sender<Request>>>,
    sent: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryTransport {
    /// Create a new memory transport with default options
    pub fn new<D: Dispatcher>(dispatcher: D, sink: SharedSink) -> Self {
        Self::with_options(dispatcher, sink, MemoryOptions::default())
    }

    /// Create a new memory transport with options
    pub fn with_options<D: Dispatcher>(
        dispatcher: D,
        sink: SharedSink,
        options: MemoryOptions,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let (sender, receiver) = flume::unbounded::<Request>();
        let dispatcher = Arc::new(dispatcher);

        let workers = (0..options.workers.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let dispatcher = Arc::clone(&dispatcher);
                let sink = Arc::clone(&sink);
                let latency = options.latency;
                thread::spawn(move || {
                    while let Ok(request) = receiver.recv() {
                        deliver(dispatcher.as_ref(), &sink, &request, latency);
                    }
                })
            })
            .collect();

        info!(
            "Memory transport {} started with {} workers",
            session_id,
            options.workers.max(1)
        );

        Self {
            session_id,
            connected: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            sent: AtomicUsize::new(0),
            workers: Mutex::new(workers),
        }
    }

    /// Number of requests accepted by `send`.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

fn deliver<D: Dispatcher>(dispatcher: &D, sink: &SharedSink, request: &Request, latency: Duration) {
    let Some(mut response) = dispatcher.dispatch(request) else {
        debug!("Dispatcher left request {:?} unanswered", request.id);
        return;
    };

    if !request.expects_response() {
        return;
    }

    if !latency.is_zero() {
        thread::sleep(latency);
    }

    if response.id.is_empty() {
        response.id.clone_from(&request.id);
    }
    sink.put_response(response);
}

impl Transport for MemoryTransport {
    fn connect(&self) -> Result<(), TransportError> {
        if self.sender.lock().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!("Memory transport {} connected", self.session_id);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("Memory transport {} disconnected", self.session_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, mut request: Request) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        request.session_id = Some(self.session_id.clone());

        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(TransportError::ConnectionClosed)?;
        sender
            .send(request)
            .map_err(|_| TransportError::ConnectionClosed)?;

        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        // Closing the channel stops the workers once the queue drains.
        self.sender.lock().take();

        let current = thread::current().id();
        for worker in self.workers.lock().drain(..) {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("Memory transport worker panicked");
            }
        }
    }
}

impl Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("sent", &self.sent_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hrpc_transport::{Invocation, InvocationPath, ResponseSink};
    use serde_json::json;

    struct RecordingSink {
        responses: Mutex<Vec<Response>>,
        tx: Mutex<Option<flume::Sender<()>>>,
    }

    impl ResponseSink for RecordingSink {
        fn put_response(&self, response: Response) {
            self.responses.lock().push(response);
            if let Some(tx) = self.tx.lock().as_ref() {
                let _ = tx.send(());
            }
        }

        fn fail_request(&self, _request_id: &str, _error: TransportError) {}
    }

    fn recording() -> (Arc<RecordingSink>, flume::Receiver<()>) {
        let (tx, rx) = flume::unbounded();
        let sink = Arc::new(RecordingSink {
            responses: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
        });
        (sink, rx)
    }

    fn request(id: &str) -> Request {
        Request {
            id: id.to_string(),
            uri: "obj://1".to_string(),
            method: InvocationPath::default().with(Invocation::attr("x")),
            session_id: None,
        }
    }

    fn echo(request: &Request) -> Option<Response> {
        Some(Response::value(String::new(), json!(request.uri)))
    }

    #[test]
    fn test_send_requires_connection() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (sink, _rx) = recording();
        let transport = MemoryTransport::new(echo, sink);

        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(request("a")),
            Err(TransportError::ConnectionClosed)
        ));
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_response_delivered_with_request_id() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (sink, rx) = recording();
        let transport = MemoryTransport::new(echo, sink.clone());

        transport.connect().unwrap();
        transport.send(request("a")).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let responses = sink.responses.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "a");
        assert_eq!(responses[0].result, Some(json!("obj://1")));
        assert_eq!(transport.sent_count(), 1);
    }

    #[test]
    fn test_session_id_is_stamped() {
        let (sink, rx) = recording();
        let transport = MemoryTransport::new(
            |request: &Request| {
                Some(Response::value(
                    request.id.clone(),
                    json!(request.session_id.clone()),
                ))
            },
            sink.clone(),
        );

        transport.connect().unwrap();
        transport.send(request("a")).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(
            sink.responses.lock()[0].result,
            Some(json!(transport.session_id()))
        );
    }

    #[test]
    fn test_fire_and_forget_gets_no_response() {
        let (sink, rx) = recording();
        let transport = MemoryTransport::new(echo, sink.clone());

        transport.connect().unwrap();
        transport.send(request("")).unwrap();
        transport.send(request("b")).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Requests are handled in order by the single worker.
        let responses = sink.responses.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, "b");
        assert_eq!(transport.sent_count(), 2);
    }

    #[test]
    fn test_workers_deliver_concurrently() {
        let (sink, rx) = recording();
        let transport = MemoryTransport::with_options(
            echo,
            sink.clone(),
            MemoryOptions {
                workers: 4,
                latency: Duration::from_millis(20),
            },
        );

        transport.connect().unwrap();
        for i in 0..8 {
            transport.send(request(&i.to_string())).unwrap();
        }
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        let mut ids: Vec<_> = sink
            .responses
            .lock()
            .iter()
            .map(|response| response.id.parse::<usize>().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_disconnect_refuses_sends() {
        let (sink, _rx) = recording();
        let transport = MemoryTransport::new(echo, sink);

        transport.connect().unwrap();
        transport.disconnect().unwrap();

        assert!(transport.send(request("a")).is_err());
    }
}
