use core::fmt;
use core::time::Duration;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// One of the two events of a [`WakeEvents`] pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeEvent {
    /// Auto-reset: a set event releases exactly one waiter and clears itself
    /// as that waiter returns.
    One,
    /// Manual-reset: a set event releases every waiter until it is reset.
    All,
}

#[derive(Clone, Copy)]
struct EventFlags {
    one: bool,
    all: bool,
}

/// An auto-reset event and a manual-reset event, waited on together.
///
/// [`wait_any`](Self::wait_any) returns as soon as either event is set, and
/// reports which. If both are set, [`WakeEvent::One`] wins.
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use vc_os::utils::{WakeEvent, WakeEvents};
///
/// let events = WakeEvents::new();
/// assert_eq!(events.wait_any(Some(Duration::ZERO)), None);
///
/// events.set(WakeEvent::One);
/// assert_eq!(events.wait_any(None), Some(WakeEvent::One));
/// // consumed by the wait above
/// assert_eq!(events.wait_any(Some(Duration::ZERO)), None);
///
/// events.set(WakeEvent::All);
/// assert_eq!(events.wait_any(None), Some(WakeEvent::All));
/// assert_eq!(events.wait_any(None), Some(WakeEvent::All));
/// events.reset(WakeEvent::All);
/// ```
pub struct WakeEvents {
    flags: Mutex<EventFlags>,
    changed: Condvar,
}

impl WakeEvents {
    /// Creates the pair with both events unset.
    pub const fn new() -> Self {
        Self {
            flags: Mutex::new(EventFlags {
                one: false,
                all: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Sets `event`, releasing waiters as described by [`WakeEvent`].
    pub fn set(&self, event: WakeEvent) {
        let mut flags = self.flags.lock();
        match event {
            WakeEvent::One => flags.one = true,
            WakeEvent::All => flags.all = true,
        }
        drop(flags);
        // Waiters re-check the flags, so over-notifying is harmless.
        self.changed.notify_all();
    }

    /// Clears `event`.
    pub fn reset(&self, event: WakeEvent) {
        let mut flags = self.flags.lock();
        match event {
            WakeEvent::One => flags.one = false,
            WakeEvent::All => flags.all = false,
        }
    }

    /// Returns `true` if `event` is currently set.
    pub fn is_set(&self, event: WakeEvent) -> bool {
        let flags = self.flags.lock();
        match event {
            WakeEvent::One => flags.one,
            WakeEvent::All => flags.all,
        }
    }

    /// Blocks until either event is set, or until `timeout` has elapsed.
    ///
    /// Returns the event that ended the wait, or `None` on timeout. A zero
    /// timeout polls. The state is examined once more when the timeout
    /// fires, so an event set at that instant is still reported.
    pub fn wait_any(&self, timeout: Option<Duration>) -> Option<WakeEvent> {
        // An overflowing deadline is as good as no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut expired = false;

        let mut flags = self.flags.lock();
        loop {
            if flags.one {
                flags.one = false;
                return Some(WakeEvent::One);
            }
            if flags.all {
                return Some(WakeEvent::All);
            }
            if expired {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    expired = self.changed.wait_until(&mut flags, deadline).timed_out();
                }
                None => self.changed.wait(&mut flags),
            }
        }
    }
}

impl Default for WakeEvents {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WakeEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = *self.flags.lock();
        f.debug_struct("WakeEvents")
            .field("one", &flags.one)
            .field("all", &flags.all)
            .finish()
    }
}
