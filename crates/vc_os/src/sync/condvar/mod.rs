//! Condition variables with interchangeable backends.
//!
//! [`ConditionVariable`] either passes straight through to the platform
//! condition variable ([`Backend::Native`]) or runs a portable protocol built
//! from a semaphore and two wake events ([`Backend::Fallback`]). The backend
//! is picked once per condition variable, at initialization; callers see the
//! same contract either way.

use alloc::boxed::Box;
use core::fmt;
use core::time::Duration;
use std::sync::OnceLock;
use std::time::Instant;

use crate::InitError;
use crate::sync::Mutex;

mod fallback;
mod native;

use fallback::FallbackCondvar;
use native::NativeCondvar;

// -----------------------------------------------------------------------------
// RawCondvar

/// The operations every backend provides.
trait RawCondvar: Send + Sync {
    fn signal(&self);

    fn broadcast(&self);

    /// Releases `mutex`, blocks until woken or `timeout` elapses, then takes
    /// `mutex` again. Returns `true` if woken.
    ///
    /// The calling thread holds `mutex`.
    fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool;
}

/// Both backends time out in whole milliseconds, truncated.
fn wait_granularity(timeout: Duration) -> Duration {
    Duration::from_millis(timeout.as_millis().try_into().unwrap_or(u64::MAX))
}

// -----------------------------------------------------------------------------
// Backend

/// The implementation behind a [`ConditionVariable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The platform condition variable.
    Native,
    /// The portable semaphore and event protocol.
    Fallback,
}

impl Backend {
    /// The backend chosen by the process-wide capability probe.
    ///
    /// The probe runs on first use; later calls return the same answer.
    /// Building with the `force_fallback` feature makes it answer
    /// [`Backend::Fallback`].
    pub fn detect() -> Backend {
        static DETECTED: OnceLock<Backend> = OnceLock::new();

        *DETECTED.get_or_init(|| {
            let backend = if cfg!(feature = "force_fallback") || !native::is_supported() {
                Backend::Fallback
            } else {
                Backend::Native
            };
            log::debug!("condition variable backend: {backend:?}");
            backend
        })
    }

    fn create(self) -> Box<dyn RawCondvar> {
        match self {
            Backend::Native => Box::new(NativeCondvar::new()),
            Backend::Fallback => Box::new(FallbackCondvar::new()),
        }
    }
}

// -----------------------------------------------------------------------------
// WaitTimeoutResult

/// Whether a timed wait returned because it was woken or because it timed
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    /// Returns `true` if the wait timed out.
    #[must_use]
    #[inline]
    pub fn timed_out(&self) -> bool {
        self.0
    }

    /// Returns `true` if the wait was woken by a signal or broadcast.
    #[must_use]
    #[inline]
    pub fn woken(&self) -> bool {
        !self.0
    }
}

// -----------------------------------------------------------------------------
// ConditionVariable

/// A condition variable, used together with a [`Mutex`].
///
/// Starts uninitialized: [`initialize`](Self::initialize) picks the backend
/// with [`Backend::detect`], [`initialize_with`](Self::initialize_with)
/// names it explicitly. Using a condition variable before that is fatal.
///
/// Waiters must hold the mutex. Signals and broadcasts only reach threads
/// already waiting; with nobody waiting they are lost. A wait never returns
/// spuriously, but another thread may change the guarded state between the
/// wakeup and the mutex being retaken: prefer [`wait_while`](Self::wait_while)
/// over a bare [`wait`](Self::wait).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use vc_os::sync::{ConditionVariable, Mutex};
/// use vc_os::thread::Thread;
///
/// struct Shared {
///     lock: Mutex,
///     cond: ConditionVariable,
///     ready: AtomicBool,
/// }
///
/// let mut cond = ConditionVariable::new();
/// cond.initialize().unwrap();
/// let shared = Arc::new(Shared {
///     lock: Mutex::ready(),
///     cond,
///     ready: AtomicBool::new(false),
/// });
///
/// let mut thread = Thread::new();
/// let other = shared.clone();
/// thread
///     .start(move || {
///         let _guard = other.lock.guard();
///         other.ready.store(true, Ordering::Relaxed);
///         other.cond.signal();
///     })
///     .unwrap();
///
/// shared.lock.lock();
/// shared.cond.wait_while(&shared.lock, || !shared.ready.load(Ordering::Relaxed));
/// shared.lock.unlock();
///
/// thread.join();
/// ```
pub struct ConditionVariable {
    inner: Option<(Backend, Box<dyn RawCondvar>)>,
}

impl ConditionVariable {
    /// Creates an uninitialized condition variable.
    #[inline]
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Initializes with the detected backend.
    ///
    /// # Errors
    ///
    /// Reserved for backends that need an OS resource; neither backend here
    /// does, so this returns `Ok`.
    ///
    /// # Panics
    ///
    /// If already initialized.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        self.initialize_with(Backend::detect())
    }

    /// Initializes with the given backend.
    ///
    /// # Errors
    ///
    /// See [`initialize`](Self::initialize).
    ///
    /// # Panics
    ///
    /// If already initialized.
    pub fn initialize_with(&mut self, backend: Backend) -> Result<(), InitError> {
        if self.inner.is_some() {
            fatal!("condition variable initialized twice");
        }
        self.inner = Some((backend, backend.create()));
        Ok(())
    }

    /// Returns `true` once the condition variable has been initialized.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// The backend chosen at initialization.
    #[inline]
    pub fn backend(&self) -> Option<Backend> {
        self.inner.as_ref().map(|(backend, _)| *backend)
    }

    /// Wakes one waiting thread, if any.
    pub fn signal(&self) {
        self.raw("signal").signal();
    }

    /// Wakes every thread waiting right now.
    pub fn broadcast(&self) {
        self.raw("broadcast").broadcast();
    }

    /// Releases `mutex`, blocks until woken, then takes `mutex` again.
    ///
    /// # Panics
    ///
    /// If the calling thread does not hold `mutex`.
    pub fn wait(&self, mutex: &Mutex) {
        self.wait_raw(mutex, None);
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// The timeout has millisecond granularity: it is truncated to whole
    /// milliseconds, so anything below one millisecond polls. Either way
    /// `mutex` is held again on return.
    pub fn wait_timeout(&self, mutex: &Mutex, timeout: Duration) -> WaitTimeoutResult {
        WaitTimeoutResult(!self.wait_raw(mutex, Some(timeout)))
    }

    /// Waits for as long as `condition` returns `true`.
    ///
    /// `condition` runs with `mutex` held, first before any waiting.
    pub fn wait_while(&self, mutex: &Mutex, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.wait(mutex);
        }
    }

    /// Like [`wait_while`](Self::wait_while), giving up once `timeout` has
    /// elapsed in total.
    ///
    /// Reports a timeout only if `condition` still holds at the end.
    pub fn wait_timeout_while(
        &self,
        mutex: &Mutex,
        timeout: Duration,
        mut condition: impl FnMut() -> bool,
    ) -> WaitTimeoutResult {
        let start = Instant::now();
        loop {
            if !condition() {
                return WaitTimeoutResult(false);
            }
            let remaining = match timeout.checked_sub(start.elapsed()) {
                Some(remaining) => remaining,
                None => return WaitTimeoutResult(true),
            };
            self.wait_timeout(mutex, remaining);
        }
    }

    fn wait_raw(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        let raw = self.raw("wait on");
        if !mutex.is_held_by_current() {
            fatal!("cannot wait on a condition variable without holding its mutex");
        }
        raw.wait(mutex, timeout)
    }

    fn raw(&self, op: &str) -> &dyn RawCondvar {
        match &self.inner {
            Some((_, raw)) => raw.as_ref(),
            None => fatal!("cannot {op} an uninitialized condition variable"),
        }
    }
}

impl Default for ConditionVariable {
    /// Creates an uninitialized condition variable.
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}
