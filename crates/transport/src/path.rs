//! Invocation paths.
//!
//! A path is the ordered list of steps applied to a remote root object. It
//! travels as the `method` field of a request:
//!
//! ```text
//! [["getattr", "add"], ["call", [1, 2]], ["getitem", 0]]
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One step of an invocation path.
#[derive(Clone, Debug, PartialEq)]
pub enum Invocation {
    /// Attribute access.
    GetAttr(String),

    /// Call with positional arguments.
    Call(Vec<Value>),

    /// Subscript.
    GetItem(Value),
}

impl Invocation {
    /// Attribute access step.
    #[must_use]
    pub fn attr(name: impl Into<String>) -> Self {
        Self::GetAttr(name.into())
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::GetAttr(_) => "getattr",
            Self::Call(_) => "call",
            Self::GetItem(_) => "getitem",
        }
    }
}

impl Serialize for Invocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::GetAttr(name) => (self.kind(), name).serialize(serializer),
            Self::Call(args) => (self.kind(), args).serialize(serializer),
            Self::GetItem(key) => (self.kind(), key).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Invocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (kind, arg) = <(String, Value)>::deserialize(deserializer)?;

        match (kind.as_str(), arg) {
            ("getattr", Value::String(name)) => Ok(Self::GetAttr(name)),
            ("call", Value::Array(args)) => Ok(Self::Call(args)),
            ("getitem", key) => Ok(Self::GetItem(key)),
            ("getattr" | "call", arg) => Err(D::Error::custom(format!(
                "invalid argument for {kind}: {arg}"
            ))),
            (other, _) => Err(D::Error::unknown_variant(
                other,
                &["getattr", "call", "getitem"],
            )),
        }
    }
}

/// Immutable, cheaply clonable list of [`Invocation`] steps.
#[derive(Clone, PartialEq)]
pub struct InvocationPath(Arc<[Invocation]>);

impl Default for InvocationPath {
    fn default() -> Self {
        Self(Vec::new().into())
    }
}

impl InvocationPath {
    /// A new path with `step` appended. `self` is left untouched.
    #[must_use]
    pub fn with(&self, step: Invocation) -> Self {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0);
        steps.push(step);
        Self(steps.into())
    }

    /// The steps, root first.
    #[must_use]
    pub fn steps(&self) -> &[Invocation] {
        &self.0
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Invocation>> for InvocationPath {
    fn from(steps: Vec<Invocation>) -> Self {
        Self(steps.into())
    }
}

impl fmt::Debug for InvocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

// `.add(1, 2)[0]`
impl fmt::Display for InvocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in self.0.iter() {
            match step {
                Invocation::GetAttr(name) => write!(f, ".{name}")?,
                Invocation::Call(args) => {
                    f.write_str("(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(")")?;
                }
                Invocation::GetItem(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for InvocationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InvocationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Invocation>::deserialize(deserializer).map(Self::from)
    }
}
