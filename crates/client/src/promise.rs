//! Single-resolution promises backed by native futures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::warn;

use crate::error::{Error, Result};

/// Capability to settle a [`Promise`] once.
///
/// Clones share the same promise; the first settlement wins. A promise whose
/// settle handles are all dropped before settling rejects with
/// [`Error::Abandoned`].
pub struct Settle<T> {
    sender: flume::Sender<Result<T>>,
    settled: Arc<AtomicBool>,
}

impl<T> Settle<T> {
    /// Fulfil the promise with `value`. Returns false if it was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the promise with `error`. Returns false if it was already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// Settle the promise with `result`. Returns false if it was already settled.
    pub fn settle(&self, result: Result<T>) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            warn!("Ignoring second settlement of promise");
            return false;
        }
        // Capacity one and a single successful settle: never blocks. The
        // promise itself may already be gone.
        let _ = self.sender.send(result);
        true
    }

    /// Whether the promise has been settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            settled: Arc::clone(&self.settled),
        }
    }
}

impl<T> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// A value that becomes available later, exactly once.
///
/// `Promise` is a [`Future`]: await it from async code, or call
/// [`Promise::wait`] to block the current thread.
#[must_use = "promises do nothing unless awaited or waited on"]
pub struct Promise<T> {
    future: BoxFuture<'static, Result<T>>,
    settled: Arc<AtomicBool>,
}

impl<T: Send + 'static> Promise<T> {
    /// Create a promise and hand its settle capability to `executor`, which
    /// runs immediately on the current thread.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Settle<T>),
    {
        let (sender, receiver) = flume::bounded(1);
        let settled = Arc::new(AtomicBool::new(false));

        executor(Settle {
            sender,
            settled: Arc::clone(&settled),
        });

        let future = async move {
            receiver
                .recv_async()
                .await
                .unwrap_or(Err(Error::Abandoned))
        }
        .boxed();

        Self { future, settled }
    }

    /// An already fulfilled promise.
    pub fn resolved(value: T) -> Self {
        Self::settled_with(Ok(value))
    }

    /// An already rejected promise.
    pub fn rejected(error: Error) -> Self {
        Self::settled_with(Err(error))
    }

    fn settled_with(result: Result<T>) -> Self {
        Self {
            future: future::ready(result).boxed(),
            settled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the originating promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Chain `f` onto the fulfilled value. Rejections pass through untouched.
    pub fn then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        Promise {
            future: self.future.map(|result| result.and_then(f)).boxed(),
            settled: self.settled,
        }
    }

    /// Block the current thread until the promise settles.
    ///
    /// Do not call this from inside an async runtime; await the promise instead.
    ///
    /// # Errors
    ///
    /// Returns the rejection error, or [`Error::Abandoned`] if nothing can settle
    /// the promise anymore.
    pub fn wait(self) -> Result<T> {
        futures::executor::block_on(self.future)
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.settled.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    use assert_matches::assert_matches;

    #[test]
    fn test_resolve_settles_once() {
        let mut handle = None;
        let promise = Promise::new(|settle| handle = Some(settle));
        let settle = handle.unwrap();

        assert!(!promise.is_settled());
        assert!(settle.resolve(1));
        assert!(!settle.resolve(2));
        assert!(!settle.reject(Error::Abandoned));
        assert!(promise.is_settled());

        assert_eq!(promise.wait().unwrap(), 1);
    }

    #[test]
    fn test_executor_can_reject_synchronously() {
        let promise: Promise<i32> = Promise::new(|settle| {
            settle.reject(Error::Abandoned);
        });

        assert!(promise.is_settled());
        assert_matches!(promise.wait(), Err(Error::Abandoned));
    }

    #[test]
    fn test_dropped_settle_rejects_with_abandoned() {
        let promise: Promise<i32> = Promise::new(drop);

        assert!(!promise.is_settled());
        assert_matches!(promise.wait(), Err(Error::Abandoned));
    }

    #[test]
    fn test_settled_from_another_thread() {
        let promise = Promise::new(|settle| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                settle.resolve("done");
            });
        });

        assert_eq!(promise.wait().unwrap(), "done");
    }

    #[test]
    fn test_then_chains_and_passes_rejections() {
        let doubled = Promise::resolved(21).then(|value| Ok(value * 2));
        assert_eq!(doubled.wait().unwrap(), 42);

        let rejected: Promise<i32> = Promise::<i32>::rejected(Error::Abandoned).then(|value| Ok(value * 2));
        assert_matches!(rejected.wait(), Err(Error::Abandoned));
    }

    #[tokio::test]
    async fn test_await() {
        let promise = Promise::new(|settle| {
            tokio::spawn(async move {
                settle.resolve(7);
            });
        });

        assert_eq!(promise.await.unwrap(), 7);
    }
}
