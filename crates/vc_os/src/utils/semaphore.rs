use core::fmt;

use parking_lot::{Condvar, Mutex};

/// A counting semaphore whose permits never exceed a fixed maximum.
///
/// Releasing a permit that would exceed the maximum is fatal: that is a
/// release without a matching acquire.
///
/// # Examples
///
/// ```
/// use vc_os::utils::Semaphore;
///
/// let gate = Semaphore::new(1, 1);
/// gate.acquire();
/// assert!(!gate.try_acquire());
/// gate.release();
/// assert!(gate.try_acquire());
/// ```
pub struct Semaphore {
    permits: Mutex<u32>,
    max: u32,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `initial` of at most `max` permits.
    ///
    /// # Panics
    ///
    /// If `initial > max` or `max == 0`.
    pub const fn new(initial: u32, max: u32) -> Self {
        assert!(max > 0 && initial <= max, "invalid semaphore bounds");
        Self {
            permits: Mutex::new(initial),
            max,
            available: Condvar::new(),
        }
    }

    /// Takes one permit, blocking until one is available.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes one permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Returns one permit.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        if *permits == self.max {
            drop(permits);
            fatal!("semaphore released beyond its maximum of {}", self.max);
        }
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Number of permits currently available.
    pub fn available(&self) -> u32 {
        *self.permits.lock()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available())
            .field("max", &self.max)
            .finish()
    }
}
