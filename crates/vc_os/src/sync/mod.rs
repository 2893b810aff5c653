//! Blocking synchronization primitives.
//!
//! - [`Mutex`] with [`MutexGuard`]: the only mutual-exclusion primitive.
//! - [`ConditionVariable`]: waits on a [`Mutex`], on either [`Backend`].
//! - [`Once`]: one successful initialization, retryable on failure.
//! - [`Monitor`] with [`MonitorGuard`]: a lock and a condition variable
//!   used together.
//!
//! [`Mutex`] and [`ConditionVariable`] start uninitialized and must be
//! initialized once before use. [`Mutex::ready`] and [`Monitor::new`] hand
//! out initialized values directly.

// -----------------------------------------------------------------------------
// Modules

mod condvar;
mod monitor;
mod mutex;
mod once;

// -----------------------------------------------------------------------------
// Exports

pub use condvar::{Backend, ConditionVariable, WaitTimeoutResult};
pub use monitor::{Monitor, MonitorGuard};
pub use mutex::{Mutex, MutexGuard};
pub use once::Once;
