//! Request/response correlation.
//!
//! Every request that expects a response registers exactly one waiter under
//! its id before it is sent: either a release signal (blocking evaluation) or
//! a callback (callback/promise evaluation). Deliveries consume the waiter
//! under the same lock that guards the response buffer, so a response releases
//! one waiter at most once.
//!
//! Callback waiters have nobody blocking on them, so they expire once older
//! than the orphan ttl and are invoked with `None`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hrpc_transport::{Response, ResponseSink, TransportError};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// What a transport delivered for a request.
pub(crate) type Delivery = std::result::Result<Response, TransportError>;

/// One-shot handler for a delivery. `None` means the waiter expired.
pub(crate) type DeliveryCallback = Box<dyn FnOnce(Option<Delivery>) + Send + 'static>;

enum Waiter {
    Signal(flume::Sender<()>),
    Callback(DeliveryCallback),
}

struct Pending {
    at: Instant,
    waiter: Waiter,
}

struct Buffered {
    at: Instant,
    delivery: Delivery,
    // Released a signal waiter that will take it; never swept.
    claimed: bool,
}

#[derive(Default)]
struct Table {
    waiters: HashMap<String, Pending>,
    buffered: HashMap<String, Buffered>,
    // Ids whose waiter timed out. Their late responses are dropped.
    abandoned: HashMap<String, Instant>,
}

impl Table {
    /// Drop orphans older than `ttl` and return the callback waiters that expired.
    fn sweep(&mut self, ttl: Duration) -> Vec<(String, DeliveryCallback)> {
        let before = self.buffered.len() + self.abandoned.len();
        self.buffered
            .retain(|_, buffered| buffered.claimed || buffered.at.elapsed() < ttl);
        self.abandoned.retain(|_, at| at.elapsed() < ttl);
        let swept = before - (self.buffered.len() + self.abandoned.len());
        if swept > 0 {
            debug!("Swept {} orphaned correlation entries", swept);
        }

        let expired_ids: Vec<String> = self
            .waiters
            .iter()
            .filter(|(_, pending)| {
                matches!(pending.waiter, Waiter::Callback(_)) && pending.at.elapsed() >= ttl
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(Pending {
                waiter: Waiter::Callback(callback),
                ..
            }) = self.waiters.remove(&id)
            {
                warn!("Callback for request {} expired without a response", id);
                self.abandoned.insert(id.clone(), Instant::now());
                expired.push((id, callback));
            }
        }
        expired
    }
}

fn expire(expired: Vec<(String, DeliveryCallback)>) {
    for (_, callback) in expired {
        callback(None);
    }
}

/// Pending-request table and response buffer behind a single mutex.
pub(crate) struct Correlator {
    table: Mutex<Table>,
    orphan_ttl: Duration,
}

impl Correlator {
    pub(crate) fn new(orphan_ttl: Duration) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            orphan_ttl,
        }
    }

    /// Register a release signal for `request_id`.
    pub(crate) fn register_signal(&self, request_id: &str) -> flume::Receiver<()> {
        let (tx, rx) = flume::bounded(1);
        self.insert_waiter(request_id, Waiter::Signal(tx));
        rx
    }

    /// Register a callback for `request_id`.
    pub(crate) fn register_callback(&self, request_id: &str, callback: DeliveryCallback) {
        self.insert_waiter(request_id, Waiter::Callback(callback));
    }

    fn insert_waiter(&self, request_id: &str, waiter: Waiter) {
        let expired = {
            let mut table = self.table.lock();
            let expired = table.sweep(self.orphan_ttl);
            let pending = Pending {
                at: Instant::now(),
                waiter,
            };
            if table
                .waiters
                .insert(request_id.to_string(), pending)
                .is_some()
            {
                warn!("Replaced existing waiter for request {}", request_id);
            }
            debug!(
                "Registered pending request {} (total: {})",
                request_id,
                table.waiters.len()
            );
            expired
        };

        expire(expired);
    }

    /// Drop the waiter for a request that was never sent.
    pub(crate) fn unregister(&self, request_id: &str) {
        self.table.lock().waiters.remove(request_id);
    }

    /// Give up on `request_id` after its waiter timed out.
    ///
    /// Returns the delivery if it slipped in between the timeout and this call;
    /// otherwise the id is tombstoned so a late response is dropped.
    pub(crate) fn abandon(&self, request_id: &str) -> Option<Delivery> {
        let mut table = self.table.lock();
        table.waiters.remove(request_id);
        if let Some(buffered) = table.buffered.remove(request_id) {
            return Some(buffered.delivery);
        }
        table
            .abandoned
            .insert(request_id.to_string(), Instant::now());
        None
    }

    /// Pop the buffered delivery for `request_id`.
    pub(crate) fn take(&self, request_id: &str) -> Option<Delivery> {
        self.table
            .lock()
            .buffered
            .remove(request_id)
            .map(|buffered| buffered.delivery)
    }

    /// Pop the buffered response for `request_id`, if one succeeded.
    pub(crate) fn get_response(&self, request_id: &str) -> Option<Response> {
        self.take(request_id).and_then(Result::ok)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.table.lock().waiters.len()
    }

    pub(crate) fn buffered_len(&self) -> usize {
        self.table.lock().buffered.len()
    }

    fn deliver(&self, request_id: &str, delivery: Delivery) {
        if request_id.is_empty() {
            debug!("Dropping delivery for request without id");
            return;
        }

        let (callback, expired) = {
            let mut table = self.table.lock();
            // Claim the target first so the sweep cannot expire it.
            let waiter = table.waiters.remove(request_id).map(|pending| pending.waiter);
            let expired = table.sweep(self.orphan_ttl);

            match waiter {
                Some(Waiter::Callback(callback)) => (Some((callback, delivery)), expired),
                Some(Waiter::Signal(signal)) => {
                    table.buffered.insert(
                        request_id.to_string(),
                        Buffered {
                            at: Instant::now(),
                            delivery,
                            claimed: true,
                        },
                    );
                    // Capacity one and a single sender: never blocks.
                    let _ = signal.send(());
                    (None, expired)
                }
                None if table.abandoned.remove(request_id).is_some() => {
                    debug!("Dropping late response for abandoned request {}", request_id);
                    (None, expired)
                }
                None => {
                    debug!("Buffering response for unclaimed request {}", request_id);
                    let previous = table.buffered.insert(
                        request_id.to_string(),
                        Buffered {
                            at: Instant::now(),
                            delivery,
                            claimed: false,
                        },
                    );
                    if previous.is_some() {
                        warn!("Duplicate response for request {}", request_id);
                    }
                    (None, expired)
                }
            }
        };

        // Run outside the lock: callbacks may evaluate again.
        expire(expired);
        if let Some((callback, delivery)) = callback {
            callback(Some(delivery));
        }
    }
}

impl ResponseSink for Correlator {
    fn put_response(&self, response: Response) {
        let request_id = response.id.clone();
        self.deliver(&request_id, Ok(response));
    }

    fn fail_request(&self, request_id: &str, error: TransportError) {
        self.deliver(request_id, Err(error));
    }
}
