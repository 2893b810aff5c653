//! Blocking building blocks the fallback condition variable is made of.
//!
//! These play the role of the kernel objects a platform without a native
//! condition variable still offers:
//!
//! - [`Semaphore`] : a counting semaphore with an upper bound on its permits.
//! - [`WakeEvents`] : an auto-reset event and a manual-reset event that can be
//!   waited on together, reporting which one ended the wait.

// -----------------------------------------------------------------------------
// Modules

mod semaphore;
mod wake_events;

// -----------------------------------------------------------------------------
// Exports

pub use semaphore::Semaphore;
pub use wake_events::{WakeEvent, WakeEvents};

// -----------------------------------------------------------------------------
// Utils for test

#[cfg(test)]
#[allow(dead_code, reason = "tests")]
pub(crate) mod tests {
    use core::{any::Any, panic::AssertUnwindSafe};
    use std::{boxed::Box, panic};

    pub(crate) fn test_unwind_panic<R>(f: impl FnOnce() -> R) -> Result<R, Box<dyn Any + Send>> {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let result = panic::catch_unwind(AssertUnwindSafe(f));

        panic::set_hook(prev_hook);
        result
    }
}
