//! Plain notification stream.
//!
//! A [`Subject`] tracks the last emitted value and broadcasts a new value to
//! its subscribers only when the configured comparator reports it as
//! different. Broadcasts iterate over a snapshot of the subscriber list, so
//! subscribers may unsubscribe (or subscribe) from inside a callback.

use crate::behavior::Derived;
use crate::observable::{partial_eq, Callback, Comparator, Observable, Piped};
use crate::subscription::Subscription;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Internal subscriber callback; receives the new and the previous value.
pub(crate) type Listener<T> = Arc<dyn Fn(&T, Option<&T>) + Send + Sync>;

struct Inner<T> {
    next_id: AtomicU64,
    // Ids are monotonic, so key order is registration order.
    listeners: RwLock<BTreeMap<u64, Listener<T>>>,
    last: Mutex<Option<T>>,
    comparator: Comparator<T>,
    upstream: Mutex<Option<Subscription>>,
}

/// A publish/subscribe stream with equality-based de-duplication.
///
/// Cloning a `Subject` yields another handle to the same stream.
pub struct Subject<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a stream that de-duplicates with `PartialEq`.
    pub fn new() -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(partial_eq(), None)
    }

    /// Create a stream with a custom equality comparator.
    pub fn with_comparator<F>(comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self::from_parts(Arc::new(comparator), None)
    }

    pub(crate) fn from_parts(comparator: Comparator<T>, last: Option<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                listeners: RwLock::new(BTreeMap::new()),
                last: Mutex::new(last),
                comparator,
                upstream: Mutex::new(None),
            }),
        }
    }

    /// The most recent value passed to `next`, if any.
    pub fn last_value(&self) -> Option<T> {
        self.inner.last.lock().clone()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Unsubscribe this stream from the stream it was piped from.
    ///
    /// No-op for streams that were not created by `pipe`.
    pub fn detach(&self) {
        let upstream = self.inner.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.unsubscribe();
        }
    }

    pub(crate) fn set_upstream(&self, subscription: Subscription) {
        *self.inner.upstream.lock() = Some(subscription);
    }

    /// Register a listener without any replay.
    pub(crate) fn register(&self, listener: Listener<T>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().insert(id, listener);

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().remove(&id);
            }
        })
    }

    /// Run the comparator against the last value and record `value` as the
    /// new last value. Returns whether it changed, and the value it replaced.
    ///
    /// The comparator runs under the lock; a panic there propagates to the
    /// caller and leaves the last value untouched.
    pub(crate) fn settle(&self, value: T) -> (bool, Option<T>) {
        let mut last = self.inner.last.lock();
        let changed = match last.as_ref() {
            Some(prev) => !(self.inner.comparator)(prev, &value),
            None => true,
        };
        let previous = last.replace(value);
        (changed, previous)
    }

    pub(crate) fn broadcast(&self, value: &T, previous: Option<&T>) {
        let snapshot: Vec<(u64, Listener<T>)> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        for (id, listener) in snapshot {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(value, previous)));
            if delivered.is_err() {
                tracing::error!(subscriber = id, "subscriber panicked during broadcast");
            }
        }
    }
}

impl<T> Default for Subject<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observable<T> for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_callback(&self, callback: Callback<T>) -> Subscription {
        self.register(Arc::new(move |value, _previous| callback(value)))
    }

    fn next(&self, value: T) {
        let (changed, previous) = self.settle(value.clone());
        if changed {
            self.broadcast(&value, previous.as_ref());
        }
    }

    fn pipe_with<U, F>(&self, transform: F, comparator: Comparator<U>) -> Derived<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) -> Piped<U> + Send + Sync + 'static,
    {
        let child = Subject::from_parts(comparator, None);
        let target = child.clone();
        let upstream = self.register(Arc::new(move |value, previous| {
            if let Piped::Emit(out) = transform(value, previous) {
                target.next(out);
            }
        }));
        child.set_upstream(upstream);
        Derived::Plain(child)
    }
}
