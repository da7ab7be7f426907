//! Lazy handles to remote objects.
//!
//! A [`RemoteObjectProxy`] names a remote root object by uri and carries the
//! invocation path applied to it so far. Building on a proxy never touches the
//! network: [`RemoteObjectProxy::call`], [`RemoteObjectProxy::attr`] and
//! [`RemoteObjectProxy::item`] return new proxies with a longer path. Only
//! [`RpcClient::evaluate`](crate::RpcClient::evaluate) and friends send anything.

use std::fmt;
use std::sync::Arc;

use hrpc_transport::{Invocation, InvocationPath};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

/// What evaluating a proxy produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// A concrete value.
    Value(Value),

    /// A reference to another remote object, already evaluated.
    Proxy(RemoteObjectProxy),
}

impl Outcome {
    /// The concrete value, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Proxy(_) => None,
        }
    }

    /// The intermediate proxy, if this is one.
    #[must_use]
    pub const fn as_proxy(&self) -> Option<&RemoteObjectProxy> {
        match self {
            Self::Value(_) => None,
            Self::Proxy(proxy) => Some(proxy),
        }
    }

    /// Consume into the concrete value, if this is one.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Proxy(_) => None,
        }
    }

    /// Consume into the intermediate proxy, if this is one.
    #[must_use]
    pub fn into_proxy(self) -> Option<RemoteObjectProxy> {
        match self {
            Self::Value(_) => None,
            Self::Proxy(proxy) => Some(proxy),
        }
    }
}

#[derive(Debug)]
enum EvalState {
    Unevaluated,
    Pending,
    Evaluated {
        value: Option<Value>,
        intermediate: Option<RemoteObjectProxy>,
    },
}

/// Result of trying to start an evaluation.
pub(crate) enum Begin {
    /// Already evaluated; nothing to send.
    Cached(Outcome),
    /// Another evaluation is in flight.
    Pending,
    /// The caller now owns the evaluation and must `finish` or `reset` it.
    Started,
}

struct ProxyInner {
    client_id: Uuid,
    uri: String,
    path: InvocationPath,
    intermediate: bool,
    state: Mutex<EvalState>,
}

/// Lazy handle to a remote value.
///
/// Clones share evaluation state: they are the same proxy. Equality is
/// identity, so two proxies with textually identical paths are not equal
/// unless one is a clone of the other.
#[derive(Clone)]
pub struct RemoteObjectProxy {
    inner: Arc<ProxyInner>,
}

impl RemoteObjectProxy {
    pub(crate) fn root(client_id: Uuid, uri: impl Into<String>) -> Self {
        Self::build(client_id, uri.into(), InvocationPath::default(), false, EvalState::Unevaluated)
    }

    pub(crate) fn intermediate(client_id: Uuid, uri: impl Into<String>, value: Value) -> Self {
        Self::build(
            client_id,
            uri.into(),
            InvocationPath::default(),
            true,
            EvalState::Evaluated {
                value: Some(value),
                intermediate: None,
            },
        )
    }

    fn build(
        client_id: Uuid,
        uri: String,
        path: InvocationPath,
        intermediate: bool,
        state: EvalState,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                client_id,
                uri,
                path,
                intermediate,
                state: Mutex::new(state),
            }),
        }
    }

    fn extend(&self, step: Invocation) -> Self {
        Self::build(
            self.inner.client_id,
            self.inner.uri.clone(),
            self.inner.path.with(step),
            false,
            EvalState::Unevaluated,
        )
    }

    /// Call `method` on the remote object with positional `args`, without evaluating.
    #[must_use]
    pub fn call<I>(&self, method: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.attr(method)
            .extend(Invocation::Call(args.into_iter().collect()))
    }

    /// Call the remote object itself with positional `args`, without evaluating.
    #[must_use]
    pub fn call_self<I>(&self, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.extend(Invocation::Call(args.into_iter().collect()))
    }

    /// Access attribute `name`, without evaluating.
    #[must_use]
    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.extend(Invocation::attr(name))
    }

    /// Subscript with `key`, without evaluating.
    #[must_use]
    pub fn item(&self, key: impl Into<Value>) -> Self {
        self.extend(Invocation::GetItem(key.into()))
    }

    /// Root uri this proxy is applied to.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Invocation path accumulated since the root.
    #[must_use]
    pub fn invocation_path(&self) -> &InvocationPath {
        &self.inner.path
    }

    /// Whether this proxy was manufactured from a response's `uri`.
    #[must_use]
    pub fn is_intermediate_uri(&self) -> bool {
        self.inner.intermediate
    }

    /// Whether evaluation completed.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        matches!(*self.inner.state.lock(), EvalState::Evaluated { .. })
    }

    /// The cached result, once evaluated.
    #[must_use]
    pub fn evaluated_value(&self) -> Option<Value> {
        match &*self.inner.state.lock() {
            EvalState::Evaluated { value, .. } => value.clone(),
            EvalState::Unevaluated | EvalState::Pending => None,
        }
    }

    pub(crate) fn client_id(&self) -> Uuid {
        self.inner.client_id
    }

    pub(crate) fn begin(&self) -> Begin {
        let mut state = self.inner.state.lock();
        match &*state {
            EvalState::Evaluated {
                value,
                intermediate,
            } => Begin::Cached(self.outcome(value.as_ref(), intermediate.as_ref())),
            EvalState::Pending => Begin::Pending,
            EvalState::Unevaluated => {
                *state = EvalState::Pending;
                Begin::Started
            }
        }
    }

    /// Record the evaluation result and return the outcome for the caller.
    pub(crate) fn finish(
        &self,
        value: Option<Value>,
        intermediate: Option<Self>,
    ) -> Outcome {
        let outcome = self.outcome(value.as_ref(), intermediate.as_ref());
        *self.inner.state.lock() = EvalState::Evaluated {
            value,
            intermediate,
        };
        outcome
    }

    /// Return a pending proxy to unevaluated after a failed evaluation.
    pub(crate) fn reset(&self) {
        let mut state = self.inner.state.lock();
        if matches!(*state, EvalState::Pending) {
            *state = EvalState::Unevaluated;
        }
    }

    fn outcome(&self, value: Option<&Value>, intermediate: Option<&Self>) -> Outcome {
        if let Some(intermediate) = intermediate {
            Outcome::Proxy(intermediate.clone())
        } else if self.inner.intermediate {
            Outcome::Proxy(self.clone())
        } else {
            Outcome::Value(value.cloned().unwrap_or(Value::Null))
        }
    }
}

impl PartialEq for RemoteObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RemoteObjectProxy {}

impl fmt::Debug for RemoteObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObjectProxy")
            .field("uri", &self.inner.uri)
            .field("path", &self.inner.path)
            .field("intermediate", &self.inner.intermediate)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
