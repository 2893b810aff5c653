//! Pass-through to the platform condition variable.

use core::time::Duration;

use super::{RawCondvar, wait_granularity};
use crate::sync::Mutex;

/// Parking-lot parks threads on every target with `std`.
pub(super) const fn is_supported() -> bool {
    true
}

/// The platform condition variable.
///
/// Waits never return spuriously: a return is either a notification or the
/// timeout.
pub(super) struct NativeCondvar {
    cond: parking_lot::Condvar,
}

impl NativeCondvar {
    pub(super) const fn new() -> Self {
        Self {
            cond: parking_lot::Condvar::new(),
        }
    }
}

impl RawCondvar for NativeCondvar {
    fn signal(&self) {
        self.cond.notify_one();
    }

    fn broadcast(&self) {
        self.cond.notify_all();
    }

    fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        mutex.park_with(|guard| match timeout {
            None => {
                self.cond.wait(guard);
                true
            }
            Some(timeout) => !self.cond.wait_for(guard, wait_granularity(timeout)).timed_out(),
        })
    }
}
