use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;

use super::{Backend, ConditionVariable, Mutex, MutexGuard, WaitTimeoutResult};
use crate::InitError;

// -----------------------------------------------------------------------------
// Monitor

/// One lock and one condition variable, for the wait / notify protocol.
///
/// [`lock`](Self::lock) returns a [`MonitorGuard`]; all waiting and
/// notifying goes through it, so the lock is always held while waiting.
///
/// Several monitors can share one lock: [`sharing_lock`](Self::sharing_lock)
/// creates a monitor with its own condition variable over this monitor's
/// lock, and a guard of either can wait on the other's condition with
/// [`MonitorGuard::wait_on`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use vc_os::sync::Monitor;
/// use vc_os::thread::Thread;
///
/// let monitor = Arc::new(Monitor::new().unwrap());
/// let done = Arc::new(AtomicBool::new(false));
///
/// let mut worker = Thread::new();
/// let (m, d) = (monitor.clone(), done.clone());
/// worker
///     .start(move || {
///         let guard = m.lock();
///         d.store(true, Ordering::Relaxed);
///         guard.notify();
///     })
///     .unwrap();
///
/// let mut guard = monitor.lock();
/// while !done.load(Ordering::Relaxed) {
///     guard.wait();
/// }
/// drop(guard);
/// worker.join();
/// ```
pub struct Monitor {
    lock: Arc<Mutex>,
    cond: ConditionVariable,
}

impl Monitor {
    /// Creates a monitor whose condition variable uses the detected backend.
    ///
    /// # Errors
    ///
    /// If the lock or the condition variable cannot be initialized.
    pub fn new() -> Result<Self, InitError> {
        Self::with_backend(Backend::detect())
    }

    /// Creates a monitor whose condition variable uses `backend`.
    ///
    /// # Errors
    ///
    /// If the lock or the condition variable cannot be initialized.
    pub fn with_backend(backend: Backend) -> Result<Self, InitError> {
        Self::over(Arc::new(Mutex::ready()), backend)
    }

    /// Creates a monitor over this monitor's lock, with a condition
    /// variable of its own on the same backend.
    ///
    /// # Errors
    ///
    /// If the condition variable cannot be initialized.
    pub fn sharing_lock(&self) -> Result<Self, InitError> {
        Self::over(self.lock.clone(), self.backend())
    }

    /// Returns `true` if both monitors use the same lock.
    #[inline]
    pub fn is_for(&self, other: &Monitor) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Blocks until the calling thread holds the lock.
    #[inline]
    pub fn lock(&self) -> MonitorGuard<'_> {
        MonitorGuard {
            monitor: self,
            guard: self.lock.guard(),
        }
    }

    /// The monitor's own condition variable.
    #[inline]
    pub fn condition(&self) -> &ConditionVariable {
        &self.cond
    }

    /// The backend of the monitor's condition variable.
    pub fn backend(&self) -> Backend {
        match self.cond.backend() {
            Some(backend) => backend,
            None => fatal!("monitor condition variable is uninitialized"),
        }
    }

    fn over(lock: Arc<Mutex>, backend: Backend) -> Result<Self, InitError> {
        let mut cond = ConditionVariable::new();
        cond.initialize_with(backend)?;
        Ok(Self { lock, cond })
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("lock", &self.lock)
            .field("cond", &self.cond)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// MonitorGuard

/// A held monitor lock. Dropping it unlocks.
#[must_use = "the monitor unlocks as soon as the guard is dropped"]
pub struct MonitorGuard<'a> {
    monitor: &'a Monitor,
    guard: MutexGuard<'a>,
}

impl<'a> MonitorGuard<'a> {
    /// Releases the lock, waits for a notification, then takes it again.
    #[inline]
    pub fn wait(&mut self) {
        let monitor: &'a Monitor = self.monitor;
        self.wait_on(&monitor.cond);
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    #[inline]
    pub fn wait_timeout(&mut self, timeout: Duration) -> WaitTimeoutResult {
        let monitor: &'a Monitor = self.monitor;
        self.wait_on_timeout(&monitor.cond, timeout)
    }

    /// Waits for as long as `condition` returns `true`.
    pub fn wait_while(&mut self, condition: impl FnMut() -> bool) {
        self.monitor.cond.wait_while(self.guard.mutex(), condition);
    }

    /// Waits on some other condition variable used with this lock, such as
    /// the [`condition`](Monitor::condition) of a monitor created with
    /// [`Monitor::sharing_lock`].
    #[inline]
    pub fn wait_on(&mut self, cond: &ConditionVariable) {
        cond.wait(self.guard.mutex());
    }

    /// Like [`wait_on`](Self::wait_on), giving up after `timeout`.
    #[inline]
    pub fn wait_on_timeout(
        &mut self,
        cond: &ConditionVariable,
        timeout: Duration,
    ) -> WaitTimeoutResult {
        cond.wait_timeout(self.guard.mutex(), timeout)
    }

    /// Wakes one thread waiting on the monitor.
    #[inline]
    pub fn notify(&self) {
        self.monitor.cond.signal();
    }

    /// Wakes every thread waiting on the monitor.
    #[inline]
    pub fn notify_all(&self) {
        self.monitor.cond.broadcast();
    }

    /// Releases the lock while `f` runs, then takes it again.
    #[inline]
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.guard.unlocked(f)
    }

    /// The monitor this guard locks.
    #[inline]
    pub fn monitor(&self) -> &'a Monitor {
        self.monitor
    }
}

impl fmt::Debug for MonitorGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorGuard").finish_non_exhaustive()
    }
}
