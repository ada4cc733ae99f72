// Single-use callback slots.
//
// Firing consumes the slot, so a second internal trigger cannot re-fire a
// stale handler; re-registering re-arms it.

use parking_lot::Mutex;
use std::sync::Arc;

/// A shareable callback that may be stored in a [`FireOnce`] slot.
pub type SharedCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A callback slot that fires at most once per registration.
///
/// `set` overwrites any prior registration; `fire` consumes the slot and
/// returns whether a callback actually ran. Re-registering re-arms the slot.
pub struct FireOnce<T> {
    slot: Mutex<Option<SharedCallback<T>>>,
}

impl<T> FireOnce<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Register a callback, replacing any prior one.
    pub fn set(&self, cb: SharedCallback<T>) {
        *self.slot.lock() = Some(cb);
    }

    /// Drop any registered callback without firing it.
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Invoke and consume the registered callback, if any.
    ///
    /// The slot is emptied before the callback runs, so a re-entrant trigger
    /// from inside the callback is still a no-op.
    pub fn fire(&self, value: T) -> bool {
        let cb = self.slot.lock().take();
        match cb {
            Some(cb) => {
                cb(value);
                true
            }
            None => false,
        }
    }
}

impl<T> Default for FireOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}
