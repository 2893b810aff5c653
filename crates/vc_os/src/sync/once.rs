use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering::{Acquire, Relaxed, Release}};

use super::Mutex;

/// A gate that lets one successful callback through, once per process.
///
/// A callback that reports failure leaves the gate open, so a later caller
/// may retry. Once one has succeeded, every call returns success without
/// running its callback.
///
/// Callbacks run with the gate's lock held: concurrent callers wait for the
/// running callback to finish, and calling into the same gate from inside
/// the callback is fatal.
///
/// # Examples
///
/// ```
/// use vc_os::sync::Once;
///
/// static INIT: Once = Once::new();
///
/// assert!(!INIT.call(|| false));
/// assert!(!INIT.is_completed());
///
/// assert!(INIT.call(|| true));
/// assert!(INIT.call(|| unreachable!()));
/// assert!(INIT.is_completed());
/// ```
pub struct Once {
    guard: Mutex,
    ran: AtomicBool,
}

impl Once {
    /// Creates an open gate.
    #[inline]
    pub const fn new() -> Self {
        Self {
            guard: Mutex::ready(),
            ran: AtomicBool::new(false),
        }
    }

    /// Runs `callback` unless a callback has already succeeded.
    ///
    /// Returns `true` if this or an earlier callback succeeded.
    pub fn call(&self, callback: impl FnOnce() -> bool) -> bool {
        self.try_call(|| if callback() { Ok(()) } else { Err(()) }).is_ok()
    }

    /// Like [`call`](Self::call), with the callback's error handed back.
    ///
    /// # Errors
    ///
    /// Whatever `callback` returned; the gate stays open.
    pub fn try_call<E>(&self, callback: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        if self.ran.load(Acquire) {
            return Ok(());
        }

        let _guard = self.guard.guard();
        // Another caller may have completed while we waited for the lock.
        if self.ran.load(Relaxed) {
            return Ok(());
        }

        callback()?;
        self.ran.store(true, Release);
        Ok(())
    }

    /// Returns `true` once a callback has succeeded.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.ran.load(Acquire)
    }
}

impl Default for Once {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Once {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Once")
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::Once;

    #[test]
    fn smoke_once() {
        static O: Once = Once::new();
        let mut a = 0;
        assert!(O.call(|| {
            a += 1;
            true
        }));
        assert_eq!(a, 1);
        assert!(O.call(|| {
            a += 1;
            true
        }));
        assert_eq!(a, 1);
    }

    #[test]
    fn concurrent_callers_run_once() {
        const M: usize = 10;
        let once = Arc::new(Once::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(M));

        let handles: Vec<_> = (0..M)
            .map(|_| {
                let (once, runs, barrier) = (once.clone(), runs.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    once.call(|| {
                        runs.fetch_add(1, SeqCst);
                        true
                    })
                })
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(runs.load(SeqCst), 1);
    }

    #[test]
    fn failures_leave_the_gate_open() {
        let once = Once::new();
        let mut attempts = 0;

        for _ in 0..3 {
            let res = once.try_call(|| {
                attempts += 1;
                Err(attempts)
            });
            assert_eq!(res, Err(attempts));
        }
        assert!(!once.is_completed());

        assert_eq!(once.try_call::<()>(|| Ok(())), Ok(()));
        assert!(once.is_completed());
        assert_eq!(once.try_call(|| Err("not run")), Ok(()));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn panicking_callback_can_be_retried() {
        let once = Once::new();
        let res = panic::catch_unwind(AssertUnwindSafe(|| once.call(|| panic!("first attempt"))));
        assert!(res.is_err());
        assert!(!once.is_completed());

        assert!(once.call(|| true));
    }

    #[test]
    #[should_panic = "already holds it"]
    fn reentrant_call_is_fatal() {
        let once = Once::new();
        once.call(|| once.call(|| true));
    }
}
