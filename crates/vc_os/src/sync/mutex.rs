#![expect(unsafe_code, reason = "Explicit lock/unlock runs the platform lock without a guard.")]

use core::{fmt, marker::PhantomData, mem};
use core::sync::atomic::{AtomicU64, Ordering::Relaxed};

use crate::InitError;
use crate::thread::ThreadId;

// -----------------------------------------------------------------------------
// LockState

/// The platform lock plus the id of the thread holding it.
struct LockState {
    lock: parking_lot::Mutex<()>,
    // `ThreadId::as_u64` of the holder, `0` while unlocked. Only the holder
    // writes it, so a thread reading its own id here really holds the lock.
    owner: AtomicU64,
}

impl LockState {
    const fn new() -> Self {
        Self {
            lock: parking_lot::Mutex::new(()),
            owner: AtomicU64::new(0),
        }
    }

    fn held_by(&self, id: ThreadId) -> bool {
        self.owner.load(Relaxed) == id.as_u64()
    }

    /// Gives up ownership, leaving the platform lock itself locked.
    fn disown(&self, op: &str) -> ThreadId {
        let me = ThreadId::current();
        if !self.held_by(me) {
            fatal!("cannot {op} a mutex that thread {me} does not hold");
        }
        self.owner.store(0, Relaxed);
        me
    }
}

// -----------------------------------------------------------------------------
// Mutex

/// A non-reentrant exclusive lock.
///
/// A `Mutex` starts uninitialized: [`initialize`](Self::initialize) it, or
/// build it with [`Mutex::ready`], before calling [`lock`](Self::lock).
///
/// The lock protects no data of its own; it guards whatever the caller
/// decides it guards. Use [`MutexGuard`] for scoped locking.
///
/// The lock and unlock states are checked:
///
/// - locking or unlocking an uninitialized mutex,
/// - locking a mutex the calling thread already holds,
/// - unlocking a mutex the calling thread does not hold,
/// - dropping a locked or never initialized mutex,
///
/// are all fatal.
///
/// # Examples
///
/// ```
/// use vc_os::sync::Mutex;
///
/// let mut mutex = Mutex::new();
/// mutex.initialize().unwrap();
///
/// mutex.lock();
/// assert!(mutex.is_locked());
/// mutex.unlock();
/// ```
pub struct Mutex {
    state: Option<LockState>,
}

impl Mutex {
    /// Creates an uninitialized mutex.
    #[inline]
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// Creates an initialized mutex.
    ///
    /// The platform lock needs no OS resource up front, so this cannot fail
    /// and can be used for statics.
    ///
    /// ```
    /// use vc_os::sync::Mutex;
    ///
    /// static LOCK: Mutex = Mutex::ready();
    ///
    /// LOCK.lock();
    /// LOCK.unlock();
    /// ```
    #[inline]
    pub const fn ready() -> Self {
        Self {
            state: Some(LockState::new()),
        }
    }

    /// Initializes the platform lock. Must happen exactly once, before use.
    ///
    /// # Errors
    ///
    /// Reserved for platforms whose locks need an OS resource; the lock used
    /// here does not, so this returns `Ok`.
    ///
    /// # Panics
    ///
    /// If the mutex is already initialized.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        if self.state.is_some() {
            fatal!("mutex initialized twice");
        }
        self.state = Some(LockState::new());
        Ok(())
    }

    /// Returns `true` once the mutex has been initialized.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Returns `true` if some thread holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.lock.is_locked())
    }

    /// Blocks until the calling thread holds the lock.
    ///
    /// No fairness between contending threads is guaranteed.
    pub fn lock(&self) {
        let state = self.state("lock");
        let me = ThreadId::current();
        if state.held_by(me) {
            fatal!("mutex locked again by thread {me}, which already holds it");
        }
        // Ownership passes to the explicit `unlock` call.
        mem::forget(state.lock.lock());
        state.owner.store(me.as_u64(), Relaxed);
    }

    /// Releases the lock held by the calling thread.
    pub fn unlock(&self) {
        let state = self.state("unlock");
        state.disown("unlock");
        // SAFETY: `disown` verified the calling thread holds the lock, and
        // the guard acquired in `lock` was forgotten.
        unsafe { state.lock.force_unlock() };
    }

    /// Returns `true` if the calling thread holds the lock.
    pub(crate) fn is_held_by_current(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.held_by(ThreadId::current()))
    }

    /// Locks the mutex for the lifetime of the returned guard.
    #[inline]
    pub fn guard(&self) -> MutexGuard<'_> {
        MutexGuard::new(self)
    }

    /// Hands the held platform lock to `park` as a guard, for the native
    /// condition variable to release and reacquire.
    ///
    /// The calling thread must hold the lock; it holds it again afterwards.
    pub(crate) fn park_with<R>(
        &self,
        park: impl FnOnce(&mut parking_lot::MutexGuard<'_, ()>) -> R,
    ) -> R {
        let state = self.state("wait on");
        let me = state.disown("wait on");

        // SAFETY: `disown` verified the calling thread holds the lock. The
        // guard is forgotten below, returning the lock to explicit unlocking.
        let mut guard = unsafe { state.lock.make_guard_unchecked() };
        let result = park(&mut guard);
        mem::forget(guard);

        state.owner.store(me.as_u64(), Relaxed);
        result
    }

    fn state(&self, op: &str) -> &LockState {
        match &self.state {
            Some(state) => state,
            None => fatal!("cannot {op} an uninitialized mutex"),
        }
    }
}

impl Default for Mutex {
    /// Creates an uninitialized mutex.
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        match &self.state {
            None => fatal_in_drop!("mutex dropped without ever being initialized"),
            Some(state) if state.lock.is_locked() => {
                fatal_in_drop!("mutex dropped while held by thread {}", state.owner.load(Relaxed));
            }
            Some(_) => {}
        }
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match &self.state {
            Some(state) => {
                d.field("locked", &state.lock.is_locked());
            }
            None => {
                d.field("initialized", &false);
            }
        }
        d.finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// MutexGuard

/// A scoped lock: locks on creation, unlocks when dropped.
///
/// The guard is bound to the thread that created it.
///
/// # Examples
///
/// ```
/// use vc_os::sync::{Mutex, MutexGuard};
///
/// let mutex = Mutex::ready();
/// {
///     let _guard = MutexGuard::new(&mutex);
///     assert!(mutex.is_locked());
/// }
/// assert!(!mutex.is_locked());
/// ```
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    // !Send: the lock must be released by the thread that took it.
    _marker: PhantomData<*const ()>,
}

impl<'a> MutexGuard<'a> {
    /// Locks `mutex` until the guard is dropped.
    #[inline]
    pub fn new(mutex: &'a Mutex) -> Self {
        mutex.lock();
        Self {
            mutex,
            _marker: PhantomData,
        }
    }

    /// The locked mutex.
    #[inline]
    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }

    /// Releases the lock while `f` runs, then takes it again.
    ///
    /// The lock is retaken even if `f` panics.
    ///
    /// ```
    /// use vc_os::sync::Mutex;
    ///
    /// let mutex = Mutex::ready();
    /// let mut guard = mutex.guard();
    /// guard.unlocked(|| assert!(!mutex.is_locked()));
    /// assert!(mutex.is_locked());
    /// ```
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        struct Relock<'b>(&'b Mutex);

        impl Drop for Relock<'_> {
            fn drop(&mut self) {
                self.0.lock();
            }
        }

        self.mutex.unlock();
        let _relock = Relock(self.mutex);
        f()
    }
}

impl Drop for MutexGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}
