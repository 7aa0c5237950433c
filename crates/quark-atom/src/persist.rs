//! Persistence pipeline: hydration, the update gate and write-back.
//!
//! Hydration reads `{ "data", "version" }` from the store once, at build
//! time. A synchronous decode commits before the atom is handed out. A
//! deferred decode opens a hydration window: `update` calls are buffered
//! until the hydrated value is committed, then replayed in arrival order.
//!
//! Write-back is a piped listener on the atom's state feeding a single writer
//! task, so writes reach the store in commit order.

use crate::config::PersistConfig;
use crate::error::AtomError;
use crate::scheduler::{Admission, Scheduler, UpdateHandle};
use crate::store::KeyValueStore;
use crate::transform::{Deserializer, Serializer, Transform};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use quark_stream::{BehaviorSubject, Derived, Observable, Piped};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Stored shape of a persisted atom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub data: serde_json::Value,
    pub version: String,
}

/// Result of reading the persisted record.
pub(crate) enum Loaded<T> {
    /// Nothing usable in the store.
    Miss,
    /// Record had another version and was removed.
    Stale,
    /// Decoded synchronously.
    Ready(T),
    /// Decode still in flight.
    Deferred(BoxFuture<'static, Result<T, AtomError>>),
}

pub(crate) async fn load<T>(
    config: &PersistConfig,
    store: &dyn KeyValueStore,
    decode: &Deserializer<T>,
) -> Loaded<T> {
    let raw = match store.get(&config.key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::debug!(key = %config.key, "no persisted record");
            return Loaded::Miss;
        }
        Err(e) => {
            tracing::warn!(key = %config.key, error = %e, "failed to read persisted record");
            return Loaded::Miss;
        }
    };

    let record: PersistedRecord = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(key = %config.key, error = %e, "malformed persisted record");
            return Loaded::Miss;
        }
    };

    if record.version != config.app_version {
        tracing::debug!(
            key = %config.key,
            stored = %record.version,
            expected = %config.app_version,
            "discarding persisted record with stale version"
        );
        if let Err(e) = store.remove(&config.key).await {
            tracing::warn!(key = %config.key, error = %e, "failed to remove stale record");
        }
        return Loaded::Stale;
    }

    match decode(record.data) {
        Transform::Ready(Ok(value)) => Loaded::Ready(value),
        Transform::Ready(Err(e)) => {
            tracing::warn!(key = %config.key, error = %e, "failed to decode persisted record");
            Loaded::Miss
        }
        Transform::Deferred(future) => Loaded::Deferred(future),
    }
}

/// Hydration flag plus the actions that arrived while it was set.
pub(crate) struct Hydration<A> {
    hydrating: bool,
    buffer: Vec<A>,
}

enum WriteOp<T> {
    Put(T),
    Flush(oneshot::Sender<()>),
}

/// Persistence state attached to an atom.
pub(crate) struct Persistence<T, A> {
    hydration: Arc<Mutex<Hydration<A>>>,
    writes: mpsc::UnboundedSender<WriteOp<T>>,
    _write_back: Derived<()>,
}

impl<T, A> Persistence<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Hydrate `state` from the store and attach write-back.
    ///
    /// Returns the persistence handle and a receiver that turns `true` once
    /// hydration and buffer replay are done.
    pub(crate) async fn attach(
        config: PersistConfig,
        store: Arc<dyn KeyValueStore>,
        encode: Serializer<T>,
        decode: Deserializer<T>,
        state: &BehaviorSubject<T>,
        scheduler: &Arc<Scheduler<T, A>>,
    ) -> (Self, watch::Receiver<bool>) {
        let loaded = load(&config, store.as_ref(), &decode).await;

        let deferred = match loaded {
            Loaded::Miss | Loaded::Stale => None,
            Loaded::Ready(value) => {
                tracing::debug!(key = %config.key, "hydrated synchronously");
                state.next(value);
                None
            }
            Loaded::Deferred(future) => Some(future),
        };

        let hydration = Arc::new(Mutex::new(Hydration {
            hydrating: deferred.is_some(),
            buffer: Vec::new(),
        }));

        let (writes, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(config.clone(), store, encode, queue));

        let write_back = {
            let hydration = Arc::clone(&hydration);
            let writes = writes.clone();
            state.pipe(move |value: &T, previous: Option<&T>| -> Piped<()> {
                if previous.is_some() && !hydration.lock().hydrating {
                    let _ = writes.send(WriteOp::Put(value.clone()));
                }
                Piped::Stop
            })
        };

        let (ready, ready_rx) = watch::channel(deferred.is_none());
        if let Some(future) = deferred {
            tracing::debug!(key = %config.key, "hydration deferred");
            tokio::spawn(finish_hydration(
                config.key,
                future,
                state.clone(),
                Arc::clone(scheduler),
                Arc::clone(&hydration),
                ready,
            ));
        }

        let persistence = Self {
            hydration,
            writes,
            _write_back: write_back,
        };
        (persistence, ready_rx)
    }

    /// Buffer `action` if hydration is still in flight; otherwise hand it back.
    ///
    /// The caller must submit a returned action without re-checking: replays
    /// are admitted under the same lock, so a live update observed after
    /// hydration can never overtake them.
    pub(crate) fn gate(&self, action: A) -> Option<A> {
        let mut hydration = self.hydration.lock();
        if hydration.hydrating {
            hydration.buffer.push(action);
            tracing::debug!(buffered = hydration.buffer.len(), "update buffered during hydration");
            None
        } else {
            Some(action)
        }
    }

    pub(crate) fn is_hydrating(&self) -> bool {
        self.hydration.lock().hydrating
    }

    /// Wait for every write enqueued before this call.
    pub(crate) async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.writes.send(WriteOp::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }
}

async fn finish_hydration<T, A>(
    key: String,
    future: BoxFuture<'static, Result<T, AtomError>>,
    state: BehaviorSubject<T>,
    scheduler: Arc<Scheduler<T, A>>,
    hydration: Arc<Mutex<Hydration<A>>>,
    ready: watch::Sender<bool>,
) where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    match future.await {
        // Still flagged as hydrating, so this commit is not written back.
        Ok(value) => {
            tracing::debug!(key = %key, "hydration resolved");
            state.next(value);
        }
        Err(e) => {
            tracing::error!(key = %key, error = %e, "hydration failed; keeping initial value");
        }
    }

    let replays: Vec<UpdateHandle> = {
        let mut hydration = hydration.lock();
        hydration.hydrating = false;
        let buffered = std::mem::take(&mut hydration.buffer);
        if !buffered.is_empty() {
            tracing::debug!(key = %key, count = buffered.len(), "replaying buffered updates");
        }
        buffered
            .into_iter()
            .map(|action| scheduler.submit(action, Admission::Replay))
            .collect()
    };

    for handle in replays {
        if let Err(e) = handle.await {
            tracing::warn!(key = %key, error = %e, "buffered update failed");
        }
    }

    let _ = ready.send(true);
}

async fn run_writer<T>(
    config: PersistConfig,
    store: Arc<dyn KeyValueStore>,
    encode: Serializer<T>,
    mut queue: mpsc::UnboundedReceiver<WriteOp<T>>,
) {
    while let Some(op) = queue.recv().await {
        let value = match op {
            WriteOp::Put(value) => value,
            WriteOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let data = match encode(&value).resolve().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(key = %config.key, error = %e, "failed to serialize state; write dropped");
                continue;
            }
        };

        let record = PersistedRecord {
            data,
            version: config.app_version.clone(),
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %config.key, error = %e, "failed to encode record; write dropped");
                continue;
            }
        };

        if let Err(e) = store.set(&config.key, json).await {
            tracing::warn!(key = %config.key, error = %e, "failed to write state; write dropped");
        }
    }
}
