//! The atom facade.

use crate::config::{AtomConfig, ConcurrencyPolicy, PersistConfig};
use crate::error::AtomError;
use crate::persist::Persistence;
use crate::scheduler::{Admission, Scheduler, UpdateHandle, UpdateOutcome};
use crate::store::KeyValueStore;
use crate::transform::{
    identity_reducer, serde_deserializer, serde_serializer, Deserializer, Reducer, Serializer,
    Transform,
};
use futures::FutureExt;
use quark_stream::{BehaviorSubject, Comparator, Observable, Subscription};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// An observable state container with a scheduled update path.
///
/// `Atom` is a cheap handle; clones share the same state, scheduler and
/// persistence.
///
/// # Example
///
/// ```rust
/// use quark_atom::{Atom, ConcurrencyPolicy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> quark_atom::Result<()> {
/// let counter = Atom::builder(0i64)
///     .sync_reducer(|count, delta: i64| Ok(count + delta))
///     .concurrency(ConcurrencyPolicy::Queue)
///     .build()
///     .await;
///
/// counter.update(2).await?;
/// counter.update(3).await?;
/// assert_eq!(counter.value(), 5);
/// # Ok(())
/// # }
/// ```
pub struct Atom<T, A = T> {
    inner: Arc<AtomInner<T, A>>,
}

struct AtomInner<T, A> {
    state: BehaviorSubject<T>,
    scheduler: Arc<Scheduler<T, A>>,
    persistence: Option<Persistence<T, A>>,
    ready: watch::Receiver<bool>,
}

impl<T, A> Clone for Atom<T, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Atom<T, T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an in-memory atom whose updates replace the state.
    pub fn new(initial: T) -> Self {
        let state = BehaviorSubject::new(initial);
        let scheduler = Arc::new(Scheduler::new(
            state.clone(),
            identity_reducer(),
            AtomConfig::default(),
        ));
        let (_, ready) = watch::channel(true);
        Self {
            inner: Arc::new(AtomInner {
                state,
                scheduler,
                persistence: None,
                ready,
            }),
        }
    }

    /// Start configuring an atom that de-duplicates with `PartialEq`.
    pub fn builder(initial: T) -> AtomBuilder<T, T> {
        Self::builder_with_equality(initial, |a: &T, b: &T| a == b)
    }
}

impl<T> Atom<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start configuring an atom with its own equality comparator, for state
    /// types without `PartialEq`.
    pub fn builder_with_equality<F>(initial: T, comparator: F) -> AtomBuilder<T, T>
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        AtomBuilder {
            initial,
            reducer: identity_reducer(),
            comparator: Arc::new(comparator),
            config: AtomConfig::default(),
            store: None,
            encode: None,
            decode: None,
        }
    }
}

impl<T, A> Atom<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// The underlying stateful stream.
    pub fn state(&self) -> &BehaviorSubject<T> {
        &self.inner.state
    }

    /// Clone of the current value.
    pub fn value(&self) -> T {
        self.inner.state.value()
    }

    /// Subscribe to committed values. The current value is delivered first.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.state.subscribe(callback)
    }

    /// Submit an update.
    ///
    /// Admission happens before this returns; the returned handle resolves
    /// once the update was committed or discarded. The update proceeds even
    /// if the handle is dropped. Must be called from within a Tokio runtime.
    pub fn update(&self, action: A) -> UpdateHandle {
        let action = match &self.inner.persistence {
            Some(persistence) => match persistence.gate(action) {
                Some(action) => action,
                None => return UpdateHandle::ready(Ok(UpdateOutcome::Buffered)),
            },
            None => action,
        };
        self.inner.scheduler.submit(action, Admission::Policy)
    }

    /// Check if an asynchronous hydration is still in flight.
    pub fn is_hydrating(&self) -> bool {
        self.inner
            .persistence
            .as_ref()
            .map_or(false, |persistence| persistence.is_hydrating())
    }

    /// Wait until hydration and the replay of buffered updates are done.
    pub async fn hydrated(&self) {
        let mut ready = self.inner.ready.clone();
        let _ = ready.wait_for(|done| *done).await;
    }

    /// Wait until every write-back enqueued so far reached the store.
    pub async fn flush(&self) {
        if let Some(persistence) = &self.inner.persistence {
            persistence.flush().await;
        }
    }

    /// Number of updates queued and not yet committed or discarded.
    pub fn pending(&self) -> usize {
        self.inner.scheduler.pending()
    }

    pub fn config(&self) -> &AtomConfig {
        self.inner.scheduler.config()
    }
}

/// Builder for [`Atom`].
pub struct AtomBuilder<T, A> {
    initial: T,
    reducer: Reducer<T, A>,
    comparator: Comparator<T>,
    config: AtomConfig,
    store: Option<(PersistConfig, Arc<dyn KeyValueStore>)>,
    encode: Option<Serializer<T>>,
    decode: Option<Deserializer<T>>,
}

impl<T, A> AtomBuilder<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Use an asynchronous reducer; the action type becomes `B`.
    pub fn reducer<B, F, Fut>(self, reducer: F) -> AtomBuilder<T, B>
    where
        B: Send + 'static,
        F: Fn(T, B) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AtomError>> + Send + 'static,
    {
        AtomBuilder {
            initial: self.initial,
            reducer: Arc::new(move |state: T, action: B| reducer(state, action).boxed()),
            comparator: self.comparator,
            config: self.config,
            store: self.store,
            encode: self.encode,
            decode: self.decode,
        }
    }

    /// Use a synchronous reducer; the action type becomes `B`.
    pub fn sync_reducer<B, F>(self, reducer: F) -> AtomBuilder<T, B>
    where
        B: Send + 'static,
        F: Fn(T, B) -> Result<T, AtomError> + Send + Sync + 'static,
    {
        self.reducer(move |state: T, action: B| futures::future::ready(reducer(state, action)))
    }

    /// Replace the equality comparator used for de-duplication.
    pub fn equality<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.comparator = Arc::new(comparator);
        self
    }

    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.config.concurrency = policy;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = Some(window);
        self
    }

    pub fn config(mut self, config: AtomConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist to `store` with serde encoding unless overridden with
    /// [`serialize`](Self::serialize) / [`deserialize`](Self::deserialize).
    pub fn persist<S>(mut self, config: PersistConfig, store: Arc<S>) -> Self
    where
        S: KeyValueStore,
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let store: Arc<dyn KeyValueStore> = store;
        self.store = Some((config, store));
        self.encode.get_or_insert_with(serde_serializer);
        self.decode.get_or_insert_with(serde_deserializer);
        self
    }

    /// Persist to `store` with an explicit codec, for states without serde
    /// support.
    pub fn persist_with_codec<S, E, D>(
        mut self,
        config: PersistConfig,
        store: Arc<S>,
        encode: E,
        decode: D,
    ) -> Self
    where
        S: KeyValueStore,
        E: Fn(&T) -> Transform<serde_json::Value> + Send + Sync + 'static,
        D: Fn(serde_json::Value) -> Transform<T> + Send + Sync + 'static,
    {
        let store: Arc<dyn KeyValueStore> = store;
        self.store = Some((config, store));
        self.encode = Some(Arc::new(encode));
        self.decode = Some(Arc::new(decode));
        self
    }

    /// Override how committed values are encoded for write-back.
    pub fn serialize<F>(mut self, encode: F) -> Self
    where
        F: Fn(&T) -> Transform<serde_json::Value> + Send + Sync + 'static,
    {
        self.encode = Some(Arc::new(encode));
        self
    }

    /// Override how stored data is decoded during hydration.
    pub fn deserialize<F>(mut self, decode: F) -> Self
    where
        F: Fn(serde_json::Value) -> Transform<T> + Send + Sync + 'static,
    {
        self.decode = Some(Arc::new(decode));
        self
    }

    /// Build the atom, hydrating from the store if persistence is configured.
    ///
    /// A synchronous decode is committed before this returns. A deferred one
    /// leaves the atom hydrating; see [`Atom::hydrated`].
    pub async fn build(self) -> Atom<T, A> {
        let state = BehaviorSubject::from_parts(self.initial, self.comparator);
        let scheduler = Arc::new(Scheduler::new(state.clone(), self.reducer, self.config));

        let (persistence, ready) = match (self.store, self.encode, self.decode) {
            (Some((config, store)), Some(encode), Some(decode)) => {
                let (persistence, ready) =
                    Persistence::attach(config, store, encode, decode, &state, &scheduler).await;
                (Some(persistence), ready)
            }
            _ => (None, watch::channel(true).1),
        };

        Atom {
            inner: Arc::new(AtomInner {
                state,
                scheduler,
                persistence,
                ready,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_identity_update() {
        let atom = Atom::new("a".to_string());
        let outcome = atom.update("b".to_string()).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::Committed);
        assert_eq!(atom.value(), "b");
        assert!(!atom.is_hydrating());
        assert_eq!(atom.pending(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_replays_and_dedups() {
        let atom = Atom::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = atom.subscribe(move |v| sink.lock().push(*v));

        atom.update(1).await.unwrap();
        atom.update(2).await.unwrap();
        sub.unsubscribe();
        atom.update(3).await.unwrap();

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_reducer_error_rejects_only_its_update() {
        let atom = Atom::builder(10u32)
            .sync_reducer(|balance, withdraw: u32| {
                balance
                    .checked_sub(withdraw)
                    .ok_or_else(|| AtomError::reducer("insufficient balance"))
            })
            .build()
            .await;

        let bad = atom.update(50);
        let good = atom.update(4);

        assert!(bad.await.unwrap_err().is_reducer());
        assert_eq!(good.await.unwrap(), UpdateOutcome::Committed);
        assert_eq!(atom.value(), 6);
    }

    #[tokio::test]
    async fn test_custom_equality() {
        let atom = Atom::builder(1.0f64)
            .equality(|a, b| (a - b).abs() < 0.5)
            .build()
            .await;
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let _sub = atom.subscribe(move |_| *counter.lock() += 1);

        atom.update(1.2).await.unwrap();
        atom.update(3.0).await.unwrap();

        // Replay plus the one change outside the tolerance.
        assert_eq!(*count.lock(), 2);
        assert_eq!(atom.value(), 3.0);
    }

    #[tokio::test]
    async fn test_builder_with_equality_accepts_state_without_partial_eq() {
        #[derive(Clone, Debug)]
        struct Reading {
            sensor: &'static str,
            value: u32,
        }

        let atom = Atom::builder_with_equality(Reading { sensor: "a", value: 1 }, |a: &Reading, b: &Reading| {
            a.value == b.value
        })
        .build()
        .await;
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let _sub = atom.subscribe(move |_| *counter.lock() += 1);

        atom.update(Reading { sensor: "b", value: 1 }).await.unwrap();
        atom.update(Reading { sensor: "c", value: 2 }).await.unwrap();

        assert_eq!(*count.lock(), 2);
        assert_eq!(atom.value().sensor, "c");
        assert_eq!(atom.value().value, 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let atom = Atom::new(0);
        let handle = atom.clone();
        handle.update(9).await.unwrap();
        assert_eq!(atom.value(), 9);
    }

    #[tokio::test]
    async fn test_persisted_update_is_written() {
        let store = Arc::new(MemoryStore::new());
        let atom = Atom::builder(0u32)
            .persist(PersistConfig::new("count"), store.clone())
            .build()
            .await;

        atom.update(4).await.unwrap();
        atom.flush().await;

        assert_eq!(
            store.raw("count").as_deref(),
            Some("{\"data\":4,\"version\":\"1\"}")
        );
    }

    #[tokio::test]
    async fn test_update_buffered_while_hydrating() {
        let store = Arc::new(
            MemoryStore::new().with_entry("count", "{\"data\":5,\"version\":\"1\"}"),
        );
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));

        let atom = Atom::builder(0u32)
            .sync_reducer(|count, delta: u32| Ok(count + delta))
            .persist(PersistConfig::new("count"), store.clone())
            .deserialize(move |data| {
                let gate = gate.lock().take();
                Transform::deferred(async move {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    serde_json::from_value(data).map_err(|e| AtomError::deserialize(e.to_string()))
                })
            })
            .build()
            .await;

        assert!(atom.is_hydrating());
        assert_eq!(atom.update(1).await.unwrap(), UpdateOutcome::Buffered);
        assert_eq!(atom.value(), 0);
        assert_eq!(store.write_count(), 0);

        release.send(()).unwrap();
        atom.hydrated().await;
        atom.flush().await;

        assert!(!atom.is_hydrating());
        assert_eq!(atom.value(), 6);
        assert_eq!(store.write_count(), 1);
    }
}
