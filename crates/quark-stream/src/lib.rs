//! Quark Stream - observable notification streams
//!
//! This crate provides the publish/subscribe layer the Quark state atoms are
//! built on. Streams fan out synchronously, de-duplicate emissions with a
//! configurable equality comparator and can be derived from one another with
//! [`Observable::pipe`].
//!
//! # Quick Start
//!
//! ```rust
//! use quark_stream::{BehaviorSubject, Observable, Piped};
//!
//! let count = BehaviorSubject::new(1);
//!
//! // New subscribers are replayed the current value immediately.
//! let _sub = count.subscribe(|value| println!("count = {value}"));
//!
//! // Derived streams are seeded from the parent's current value.
//! let doubled = count.pipe(|value, _previous| Piped::Emit(value * 2));
//! assert_eq!(doubled.value(), Some(2));
//!
//! count.next(5);
//! assert_eq!(doubled.value(), Some(10));
//! ```
//!
//! # Architecture
//!
//! - [`observable`] - The shared capability trait and pipe result type
//! - [`subject`] - Plain notification stream with last-value tracking
//! - [`behavior`] - Stateful stream with replay-on-subscribe and seeded pipes
//! - [`subscription`] - Revocation handles

pub mod behavior;
pub mod observable;
pub mod subject;
pub mod subscription;

pub use behavior::{BehaviorSubject, Derived};
pub use observable::{Callback, Comparator, Observable, Piped};
pub use subject::Subject;
pub use subscription::Subscription;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::behavior::{BehaviorSubject, Derived};
    pub use crate::observable::{Observable, Piped};
    pub use crate::subject::Subject;
    pub use crate::subscription::Subscription;
}
