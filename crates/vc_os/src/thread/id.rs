use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering::Relaxed};

use std::thread_local;

// -----------------------------------------------------------------------------
// Id assignment

/// Last id handed out. `0` is reserved for [`ThreadId::none`].
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // `0` until the thread is given an id, by its creator or on first query.
    static CURRENT_ID: Cell<u64> = const { Cell::new(0) };
}

// -----------------------------------------------------------------------------
// ThreadId

/// A process-unique identity for a thread.
///
/// Ids come from one process-wide counter and are never reused, so two live
/// threads can never compare equal. The distinguished [`ThreadId::none`]
/// means "no thread".
///
/// A thread spawned through [`Thread::start`] is given its id by the
/// creating thread before it runs; any other thread (the main thread, threads
/// spawned by other libraries) is given one the first time it calls
/// [`ThreadId::current`].
///
/// [`Thread::start`]: crate::thread::Thread::start
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// The id meaning "no thread".
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_os::thread::ThreadId;
    ///
    /// assert!(ThreadId::none().is_none());
    /// assert_ne!(ThreadId::none(), ThreadId::current());
    /// ```
    #[inline(always)]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Returns `true` for [`ThreadId::none`].
    #[inline(always)]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns the id of the calling thread, assigning one if it has none yet.
    ///
    /// Repeated calls on the same thread return the same id.
    pub fn current() -> Self {
        CURRENT_ID.with(|cell| {
            let id = cell.get();
            if id != 0 {
                return Self(id);
            }
            let id = Self::next();
            cell.set(id.0);
            id
        })
    }

    /// The integral value of this id, `0` for [`ThreadId::none`].
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Draws a fresh id from the process-wide counter.
    pub(crate) fn next() -> Self {
        // Uniqueness is all that matters, the counter orders nothing else.
        let id = ID_COUNTER.fetch_add(1, Relaxed).wrapping_add(1);
        if id == 0 {
            fatal!("thread id counter overflowed");
        }
        Self(id)
    }

    /// Installs the id the creator chose, before the entry function runs.
    pub(crate) fn set_current(id: Self) {
        CURRENT_ID.with(|cell| {
            if cell.get() != 0 {
                fatal!("thread {} already has an id, cannot become {id}", cell.get());
            }
            cell.set(id.0);
        });
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("ThreadId(none)")
        } else {
            f.debug_tuple("ThreadId").field(&self.0).finish()
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            fmt::Display::fmt(&self.0, f)
        }
    }
}

impl Default for ThreadId {
    /// Returns [`ThreadId::none`].
    #[inline]
    fn default() -> Self {
        Self::none()
    }
}
