//! Stateful streams.
//!
//! [`BehaviorSubject`] composes a [`Subject`] with a retained current value.
//! It differs from the plain stream in two places only: subscribers are
//! replayed the current value synchronously before registration, and `pipe`
//! seeds the derived stream from the current value.

use crate::observable::{partial_eq, Callback, Comparator, Observable, Piped};
use crate::subject::Subject;
use crate::subscription::Subscription;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A stream that always holds a current value.
pub struct BehaviorSubject<T> {
    stream: Subject<T>,
    current: Arc<RwLock<T>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            current: self.current.clone(),
        }
    }
}

impl<T> BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a stateful stream that de-duplicates with `PartialEq`.
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(initial, partial_eq())
    }

    /// Create a stateful stream with a custom equality comparator.
    pub fn with_comparator<F>(initial: T, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self::from_parts(initial, Arc::new(comparator))
    }

    /// Create a stateful stream from a shared comparator.
    pub fn from_parts(initial: T, comparator: Comparator<T>) -> Self {
        // The inner stream starts out in sync with the current value.
        Self {
            stream: Subject::from_parts(comparator, Some(initial.clone())),
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// Clone of the current value.
    pub fn value(&self) -> T {
        self.current.read().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.current.read())
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.stream.subscriber_count()
    }

    /// Unsubscribe from the parent stream, if this stream was piped.
    pub fn detach(&self) {
        self.stream.detach();
    }
}

impl<T> Observable<T> for BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_callback(&self, callback: Callback<T>) -> Subscription {
        let current = self.value();
        let replayed = panic::catch_unwind(AssertUnwindSafe(|| callback(&current)));
        if replayed.is_err() {
            tracing::error!("subscriber panicked during replay");
        }
        self.stream.subscribe_callback(callback)
    }

    fn next(&self, value: T) {
        // Settle first so a panicking comparator leaves both values as they were.
        let (changed, previous) = self.stream.settle(value.clone());
        *self.current.write() = value.clone();
        if changed {
            self.stream.broadcast(&value, previous.as_ref());
        }
    }

    fn pipe_with<U, F>(&self, transform: F, comparator: Comparator<U>) -> Derived<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) -> Piped<U> + Send + Sync + 'static,
    {
        let seed = self.with(|current| transform(current, None));
        let child = match seed {
            Piped::Emit(value) => Derived::Stateful(BehaviorSubject::from_parts(value, comparator)),
            Piped::Stop => Derived::Plain(Subject::from_parts(comparator, None)),
        };

        let target = child.clone();
        let upstream = self.stream.register(Arc::new(move |value, previous| {
            if let Piped::Emit(out) = transform(value, previous) {
                target.next(out);
            }
        }));
        child.set_upstream(upstream);
        child
    }
}

/// Stream produced by `pipe`.
///
/// Piping a [`BehaviorSubject`] yields a stateful child unless the seeding
/// evaluation stopped propagation; piping a [`Subject`] always yields a plain
/// child.
pub enum Derived<U> {
    /// Plain stream without a retained value.
    Plain(Subject<U>),
    /// Stateful stream seeded from the parent.
    Stateful(BehaviorSubject<U>),
}

impl<U> Clone for Derived<U> {
    fn clone(&self) -> Self {
        match self {
            Derived::Plain(subject) => Derived::Plain(subject.clone()),
            Derived::Stateful(behavior) => Derived::Stateful(behavior.clone()),
        }
    }
}

impl<U> Derived<U>
where
    U: Clone + Send + Sync + 'static,
{
    /// Current value for stateful children, last emitted value for plain ones.
    pub fn value(&self) -> Option<U> {
        match self {
            Derived::Plain(subject) => subject.last_value(),
            Derived::Stateful(behavior) => Some(behavior.value()),
        }
    }

    /// Check if the child retains a current value.
    pub fn is_stateful(&self) -> bool {
        matches!(self, Derived::Stateful(_))
    }

    /// The stateful child, if seeding produced one.
    pub fn as_behavior(&self) -> Option<&BehaviorSubject<U>> {
        match self {
            Derived::Stateful(behavior) => Some(behavior),
            Derived::Plain(_) => None,
        }
    }

    /// Unsubscribe the child from its parent.
    pub fn detach(&self) {
        match self {
            Derived::Plain(subject) => subject.detach(),
            Derived::Stateful(behavior) => behavior.detach(),
        }
    }

    fn set_upstream(&self, subscription: Subscription) {
        match self {
            Derived::Plain(subject) => subject.set_upstream(subscription),
            Derived::Stateful(behavior) => behavior.stream.set_upstream(subscription),
        }
    }
}

impl<U> Observable<U> for Derived<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn subscribe_callback(&self, callback: Callback<U>) -> Subscription {
        match self {
            Derived::Plain(subject) => subject.subscribe_callback(callback),
            Derived::Stateful(behavior) => behavior.subscribe_callback(callback),
        }
    }

    fn next(&self, value: U) {
        match self {
            Derived::Plain(subject) => subject.next(value),
            Derived::Stateful(behavior) => behavior.next(value),
        }
    }

    fn pipe_with<V, F>(&self, transform: F, comparator: Comparator<V>) -> Derived<V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&U, Option<&U>) -> Piped<V> + Send + Sync + 'static,
    {
        match self {
            Derived::Plain(subject) => subject.pipe_with(transform, comparator),
            Derived::Stateful(behavior) => behavior.pipe_with(transform, comparator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribe_replays_current_value() {
        let state = BehaviorSubject::new(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        state.subscribe(move |value: &i32| sink.lock().push(*value));
        assert_eq!(*seen.lock(), vec![3]);

        state.next(4);
        assert_eq!(*seen.lock(), vec![3, 4]);
    }

    #[test]
    fn test_replay_ignores_dedup_state() {
        let state = BehaviorSubject::new(1);
        state.next(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.subscribe(move |value: &i32| sink.lock().push(*value));

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_next_equal_to_initial_is_suppressed() {
        let state = BehaviorSubject::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.subscribe(move |value: &i32| sink.lock().push(*value));

        state.next(5);

        assert_eq!(*seen.lock(), vec![5]);
    }

    #[test]
    fn test_current_value_set_even_when_suppressed() {
        let state = BehaviorSubject::with_comparator(
            (1u32, "first".to_string()),
            |a: &(u32, String), b: &(u32, String)| a.0 == b.0,
        );
        state.next((1, "second".to_string()));

        assert_eq!(state.value().1, "second");
    }

    #[test]
    fn test_pipe_seeds_stateful_child() {
        let state = BehaviorSubject::new(2);
        let squared = state.pipe(|value: &i32, _| Piped::Emit(value * value));

        assert!(squared.is_stateful());
        assert_eq!(squared.value(), Some(4));

        state.next(3);
        assert_eq!(squared.value(), Some(9));
    }

    #[test]
    fn test_pipe_seed_receives_no_previous_value() {
        let state = BehaviorSubject::new(10);
        let previous_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = previous_seen.clone();
        let _child = state.pipe(move |value: &i32, previous: Option<&i32>| {
            sink.lock().push(previous.copied());
            Piped::Emit(*value)
        });

        state.next(11);

        assert_eq!(*previous_seen.lock(), vec![None, Some(10)]);
    }

    #[test]
    fn test_pipe_suppressed_seed_yields_plain_child() {
        let state = BehaviorSubject::new(0);
        let positive = state.pipe(|value: &i32, _| {
            if *value > 0 {
                Piped::Emit(*value)
            } else {
                Piped::Stop
            }
        });

        assert!(!positive.is_stateful());
        assert_eq!(positive.value(), None);

        state.next(7);
        assert_eq!(positive.value(), Some(7));
    }

    #[test]
    fn test_pipe_link_does_not_replay() {
        let state = BehaviorSubject::new(1);
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let _child = state.pipe(move |_: &i32, _| {
            *counter.lock() += 1;
            Piped::<()>::Stop
        });

        // Only the seeding evaluation so far.
        assert_eq!(*calls.lock(), 1);
        assert_eq!(state.subscriber_count(), 1);
    }

    #[test]
    fn test_panicking_replay_is_isolated() {
        let state = BehaviorSubject::new(1);
        let _sub = state.subscribe(|_: &i32| panic!("subscriber failed"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.subscribe(move |value: &i32| sink.lock().push(*value));
        state.next(2);

        assert_eq!(state.subscriber_count(), 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(state.value(), 2);
    }

    #[test]
    fn test_comparator_panic_leaves_values_in_sync() {
        let state = BehaviorSubject::with_comparator(1, |a: &i32, b: &i32| {
            if *b == 99 {
                panic!("comparator failed");
            }
            a == b
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| state.next(99)));

        assert!(result.is_err());
        assert_eq!(state.value(), 1);
        assert_eq!(state.stream.last_value(), Some(1));

        state.next(2);
        assert_eq!(state.value(), 2);
        assert_eq!(state.stream.last_value(), Some(2));
    }

    #[test]
    fn test_derived_detach() {
        let state = BehaviorSubject::new(1);
        let child = state.pipe(|value: &i32, _| Piped::Emit(*value + 1));
        child.detach();

        state.next(5);

        assert_eq!(child.value(), Some(2));
        assert_eq!(state.subscriber_count(), 0);
    }
}
