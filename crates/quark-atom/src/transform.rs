//! Synchronous-or-asynchronous results for serialize/deserialize transforms
//! and reducers.

use crate::error::AtomError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Output of a persistence transform.
///
/// Whether a transform resolved synchronously matters for hydration: a
/// `Ready` result is committed before the atom is handed out, a `Deferred`
/// one opens the hydration window.
pub enum Transform<V> {
    /// Already computed.
    Ready(Result<V, AtomError>),
    /// Computed by a future.
    Deferred(BoxFuture<'static, Result<V, AtomError>>),
}

impl<V> Transform<V> {
    /// A successful synchronous result.
    pub fn ready(value: V) -> Self {
        Transform::Ready(Ok(value))
    }

    /// A failed synchronous result.
    pub fn failed(error: AtomError) -> Self {
        Transform::Ready(Err(error))
    }

    /// An asynchronous result.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<V, AtomError>> + Send + 'static,
    {
        Transform::Deferred(future.boxed())
    }

    /// Check if the result still has to be awaited.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Transform::Deferred(_))
    }

    /// Wait for the result.
    pub async fn resolve(self) -> Result<V, AtomError> {
        match self {
            Transform::Ready(result) => result,
            Transform::Deferred(future) => future.await,
        }
    }
}

impl<V> From<Result<V, AtomError>> for Transform<V> {
    fn from(result: Result<V, AtomError>) -> Self {
        Transform::Ready(result)
    }
}

/// Encodes a committed value into the `data` field of a persisted record.
pub type Serializer<T> = Arc<dyn Fn(&T) -> Transform<serde_json::Value> + Send + Sync>;

/// Decodes the `data` field of a persisted record.
pub type Deserializer<T> = Arc<dyn Fn(serde_json::Value) -> Transform<T> + Send + Sync>;

/// Folds an action into the current state.
pub type Reducer<T, A> = Arc<dyn Fn(T, A) -> BoxFuture<'static, Result<T, AtomError>> + Send + Sync>;

pub(crate) fn serde_serializer<T>() -> Serializer<T>
where
    T: serde::Serialize + 'static,
{
    Arc::new(|value: &T| -> Transform<serde_json::Value> {
        serde_json::to_value(value)
            .map_err(|e| AtomError::serialize(e.to_string()))
            .into()
    })
}

pub(crate) fn serde_deserializer<T>() -> Deserializer<T>
where
    T: serde::de::DeserializeOwned + 'static,
{
    Arc::new(|data: serde_json::Value| -> Transform<T> {
        serde_json::from_value(data)
            .map_err(|e| AtomError::deserialize(e.to_string()))
            .into()
    })
}

pub(crate) fn identity_reducer<T>() -> Reducer<T, T>
where
    T: Send + 'static,
{
    Arc::new(|_state: T, action: T| futures::future::ready(Ok::<T, AtomError>(action)).boxed())
}
