//! Quark Atom - observable state atoms with scheduled, persisted updates
//!
//! An [`Atom`] is a single-writer state container built on a
//! [`BehaviorSubject`](quark_stream::BehaviorSubject). Updates go through a
//! scheduler that commits them in a deterministic order regardless of how
//! long each reducer takes, and an optional persistence pipeline hydrates the
//! atom from a [`KeyValueStore`] and writes every commit back.
//!
//! # Quick Start
//!
//! ```rust
//! use quark_atom::{Atom, MemoryStore, PersistConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> quark_atom::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!
//!     let todos = Atom::builder(Vec::<String>::new())
//!         .sync_reducer(|mut todos, item: String| {
//!             todos.push(item);
//!             Ok(todos)
//!         })
//!         .persist(PersistConfig::new("todos"), store.clone())
//!         .build()
//!         .await;
//!
//!     let _sub = todos.subscribe(|list| println!("{} todo(s)", list.len()));
//!     todos.update("write docs".to_string()).await?;
//!     todos.flush().await;
//!
//!     assert!(store.raw("todos").is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`atom`] - The `Atom` handle and its builder
//! - [`scheduler`] - Queue, throttle and debounce admission of updates
//! - [`persist`] - Hydration, the update gate and write-back
//! - [`store`] - Key-value store trait with memory and file backends
//! - [`transform`] - Sync-or-async transform results, reducer types
//! - [`config`] - Scheduler and persistence configuration
//! - [`error`] - Error types

pub mod atom;
pub mod config;
pub mod error;
pub mod persist;
pub mod scheduler;
pub mod store;
pub mod transform;

// Re-exports for convenience
pub use atom::{Atom, AtomBuilder};
pub use config::{AtomConfig, AtomConfigBuilder, ConcurrencyPolicy, PersistConfig, DEFAULT_APP_VERSION};
pub use error::{AtomError, Result, StoreError};
pub use persist::PersistedRecord;
pub use scheduler::{Seq, UpdateHandle, UpdateOutcome};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use transform::{Deserializer, Reducer, Serializer, Transform};

// Re-export the stream layer the atoms are built on.
pub use quark_stream::{BehaviorSubject, Observable, Piped, Subscription};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::atom::{Atom, AtomBuilder};
    pub use crate::config::{AtomConfig, ConcurrencyPolicy, PersistConfig};
    pub use crate::error::AtomError;
    pub use crate::scheduler::{UpdateHandle, UpdateOutcome};
    pub use crate::store::{FileStore, KeyValueStore, MemoryStore};
    pub use crate::transform::Transform;
    pub use quark_stream::prelude::*;
}
