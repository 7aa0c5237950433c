//! Revocation handles returned by `subscribe`.

use parking_lot::Mutex;
use std::fmt;

type Revoke = Box<dyn FnOnce() + Send>;

/// Handle that removes a subscriber from its stream.
///
/// Revocation happens at most once; later calls to [`unsubscribe`] are
/// no-ops. Dropping the handle leaves the subscriber registered.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    revoke: Mutex<Option<Revoke>>,
}

impl Subscription {
    pub(crate) fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revoke: Mutex::new(Some(Box::new(revoke))),
        }
    }

    /// Remove the subscriber. Idempotent.
    pub fn unsubscribe(&self) {
        let revoke = self.revoke.lock().take();
        if let Some(revoke) = revoke {
            revoke();
        }
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.revoke.lock().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
