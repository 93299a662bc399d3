//! Node values.
//!
//! Values are type-erased and shared by reference, so copying a snapshot
//! never copies the data it holds. Equality is identity: two values are
//! equal when they are the same allocation.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A type-erased, shared node value.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self(Arc::new(value))
    }

    /// Borrow the value as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Value(..)")
    }
}

/// Token for one in-flight asynchronous computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadingId(u64);

impl From<u64> for LoadingId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Error a computation resolved with.
#[derive(Clone)]
pub struct LoadError(Arc<dyn StdError + Send + Sync>);

impl LoadError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    pub fn get(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl PartialEq for LoadError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for LoadError {}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadError").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Tri-state box for a node's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadable {
    /// Resolved with a value.
    Ready(Value),

    /// Waiting on an asynchronous computation.
    Loading(LoadingId),

    /// Resolved with an error.
    Failed(LoadError),
}

impl Loadable {
    /// Wrap a plain value.
    pub fn ready<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::Ready(Value::new(value))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The resolved value as `T`, if resolved and of that type.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value().and_then(Value::downcast_ref::<T>)
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}
