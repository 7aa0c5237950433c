//! The capability set shared by every stream flavour.

use crate::behavior::Derived;
use crate::subscription::Subscription;
use std::sync::Arc;

/// Notification callback registered with `subscribe`.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Equality function used to suppress duplicate emissions.
///
/// Returns `true` when the two values are equal and the second one should
/// not be broadcast.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

pub(crate) fn partial_eq<T: PartialEq>() -> Comparator<T> {
    Arc::new(|a: &T, b: &T| a == b)
}

/// Result of a `pipe` transform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piped<U> {
    /// Forward the value to the derived stream.
    Emit(U),
    /// Stop propagation; the derived stream receives nothing.
    Stop,
}

impl<U> Piped<U> {
    /// Check if this result stops propagation.
    pub fn is_stop(&self) -> bool {
        matches!(self, Piped::Stop)
    }

    /// Convert into the forwarded value, if any.
    pub fn into_option(self) -> Option<U> {
        match self {
            Piped::Emit(value) => Some(value),
            Piped::Stop => None,
        }
    }
}

impl<U> From<Option<U>> for Piped<U> {
    fn from(value: Option<U>) -> Self {
        match value {
            Some(value) => Piped::Emit(value),
            None => Piped::Stop,
        }
    }
}

/// Trait for observable streams.
///
/// Implemented by [`Subject`](crate::Subject), [`BehaviorSubject`](crate::BehaviorSubject)
/// and [`Derived`]. The stateful variant overrides replay-on-subscribe and
/// pipe seeding; everything else delegates to the plain stream.
pub trait Observable<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Register a boxed callback.
    fn subscribe_callback(&self, callback: Callback<T>) -> Subscription;

    /// Emit a value to the stream.
    fn next(&self, value: T);

    /// Derive a child stream with an explicit equality comparator.
    ///
    /// The transform receives the new value and the parent's previously
    /// emitted value.
    fn pipe_with<U, F>(&self, transform: F, comparator: Comparator<U>) -> Derived<U>
    where
        Self: Sized,
        U: Clone + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) -> Piped<U> + Send + Sync + 'static;

    /// Register a callback.
    fn subscribe<F>(&self, callback: F) -> Subscription
    where
        Self: Sized,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback))
    }

    /// Derive a child stream that de-duplicates with `PartialEq`.
    fn pipe<U, F>(&self, transform: F) -> Derived<U>
    where
        Self: Sized,
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) -> Piped<U> + Send + Sync + 'static,
    {
        self.pipe_with(transform, partial_eq())
    }
}
