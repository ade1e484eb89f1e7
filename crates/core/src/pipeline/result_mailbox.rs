use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-slot, latest-wins handoff from the worker to the caller.
///
/// A newer value replaces an unread older one; `take` returns the value at
/// most once.
pub struct ResultMailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for ResultMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultMailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store `value`. Returns `true` if an unread value was overwritten.
    pub fn publish(&self, value: T) -> bool {
        self.lock().replace(value).is_some()
    }

    /// Take the newest unread value, if any, marking it read.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn has_unread(&self) -> bool {
        self.lock().is_some()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
