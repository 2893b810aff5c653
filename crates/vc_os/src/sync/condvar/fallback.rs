//! A condition variable built from a semaphore and two wake events.
//!
//! The state is one word: the number of registered sleepers in the low bits
//! and the wakeup in progress, if any, in the two high bits.
//!
//! - `wait` takes the entry gate, registers as a sleeper, gives the gate
//!   back, releases the caller's mutex and blocks on the wake events.
//! - `signal` / `broadcast` take the entry gate, publish the wakeup mode and
//!   read the sleeper count in one step. With sleepers, the matching event is
//!   set and the gate stays taken: the last sleeper to leave hands it back.
//!   Without sleepers the wakeup is dropped and the gate is returned at once.
//! - A leaving sleeper deregisters in one step, clearing the mode too when it
//!   consumed the wake-one event. Whoever leaves last while a wakeup is still
//!   published clears the event and the mode and returns the gate. The mode
//!   is published before the event is set, so a last sleeper that timed out
//!   first waits for the event to be set, then clears it.
//!
//! Holding the gate from the start of a wakeup until its last sleeper has
//! left keeps new sleepers out of it; timeouts need no gate, so sleeper
//! deregistration is atomic with respect to wakeups.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering::{AcqRel, Acquire, Release}};
use core::time::Duration;

use super::{RawCondvar, wait_granularity};
use crate::sync::Mutex;
use crate::utils::{Semaphore, WakeEvent, WakeEvents};

const WAKEUP_MODE_NONE: u32 = 0;
const WAKEUP_MODE_ONE: u32 = 0x4000_0000;
const WAKEUP_MODE_ALL: u32 = 0x8000_0000;

const WAKEUP_MODE_MASK: u32 = WAKEUP_MODE_ONE | WAKEUP_MODE_ALL;
const SLEEPERS_COUNT_MASK: u32 = !WAKEUP_MODE_MASK;

pub(super) struct FallbackCondvar {
    // sleepers count | wakeup mode
    state: AtomicU32,
    // Serializes sleeper registration against wakeups.
    entry_gate: Semaphore,
    events: WakeEvents,
}

impl FallbackCondvar {
    pub(super) const fn new() -> Self {
        Self {
            state: AtomicU32::new(WAKEUP_MODE_NONE),
            entry_gate: Semaphore::new(1, 1),
            events: WakeEvents::new(),
        }
    }

    /// No sleepers, no wakeup in progress, gate open.
    fn is_quiescent(&self) -> bool {
        self.state.load(Acquire) == WAKEUP_MODE_NONE && self.entry_gate.available() == 1
    }

    fn wakeup(&self, mode: u32, event: WakeEvent) {
        // One wakeup at a time.
        self.entry_gate.acquire();

        let prev = self.state.fetch_add(mode, AcqRel);
        if prev & WAKEUP_MODE_MASK != WAKEUP_MODE_NONE {
            fatal!("condition variable wakeup started while another is in progress");
        }

        if prev & SLEEPERS_COUNT_MASK > 0 {
            // The last sleeper to leave returns the gate.
            self.events.set(event);
        } else {
            log::trace!("{event:?} wakeup dropped, no sleepers");
            self.state.store(WAKEUP_MODE_NONE, Release);
            self.entry_gate.release();
        }
    }

    fn leave(&self, woken_by: Option<WakeEvent>, timed: bool) {
        let sub = match woken_by {
            Some(WakeEvent::One) => 1 | WAKEUP_MODE_ONE,
            _ => 1,
        };
        let now = self.state.fetch_sub(sub, AcqRel).wrapping_sub(sub);
        let mode = now & WAKEUP_MODE_MASK;
        let sleepers = now & SLEEPERS_COUNT_MASK;

        let release_gate = match (woken_by, mode) {
            // Exactly one sleeper consumes a wake-one, it closes the cycle.
            (Some(WakeEvent::One), WAKEUP_MODE_NONE) => true,
            (Some(WakeEvent::One), _) => {
                fatal!("woken by a single wakeup while the wakeup mode is {mode:#x}")
            }
            // Timed out right as a signal committed, and nobody is left to
            // consume it.
            (None, WAKEUP_MODE_ONE) if sleepers == 0 => {
                log::trace!("last sleeper timed out with a single wakeup pending");
                // Consumes the event.
                self.await_event(WakeEvent::One);
                self.state.store(WAKEUP_MODE_NONE, Release);
                true
            }
            // Last one out of a broadcast, whether woken or timed out.
            (None | Some(WakeEvent::All), WAKEUP_MODE_ALL) if sleepers == 0 => {
                log::trace!("last sleeper left a broadcast");
                if woken_by.is_none() {
                    self.await_event(WakeEvent::All);
                }
                self.events.reset(WakeEvent::All);
                self.state.store(WAKEUP_MODE_NONE, Release);
                true
            }
            // A timeout with others still to wake, or a broadcast with more
            // sleepers to go.
            (None, _) if timed => false,
            (Some(WakeEvent::All), WAKEUP_MODE_ALL) => false,
            _ => fatal!(
                "invalid condition variable wakeup: woken by {woken_by:?}, mode {mode:#x}, {sleepers} sleepers left"
            ),
        };

        if release_gate {
            self.entry_gate.release();
        }
    }

    /// Blocks until the signaler that published the current mode has set
    /// `event`.
    fn await_event(&self, event: WakeEvent) {
        let got = self.events.wait_any(None);
        if got != Some(event) {
            fatal!("expected the {event:?} wake event, got {got:?}");
        }
    }
}

impl RawCondvar for FallbackCondvar {
    fn signal(&self) {
        self.wakeup(WAKEUP_MODE_ONE, WakeEvent::One);
    }

    fn broadcast(&self) {
        self.wakeup(WAKEUP_MODE_ALL, WakeEvent::All);
    }

    fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        // No registering while earlier sleepers still have to wake up.
        self.entry_gate.acquire();

        let prev = self.state.fetch_add(1, AcqRel);
        if prev & WAKEUP_MODE_MASK != WAKEUP_MODE_NONE {
            fatal!("sleeper registered while a wakeup is in progress");
        }
        if prev & SLEEPERS_COUNT_MASK == SLEEPERS_COUNT_MASK {
            fatal!("too many sleepers on one condition variable");
        }

        self.entry_gate.release();

        mutex.unlock();

        let woken_by = self.events.wait_any(timeout.map(wait_granularity));
        self.leave(woken_by, timeout.is_some());

        mutex.lock();

        woken_by.is_some()
    }
}

impl Drop for FallbackCondvar {
    fn drop(&mut self) {
        if !self.is_quiescent() {
            fatal_in_drop!("condition variable dropped mid-wakeup: {self:?}");
        }
    }
}

impl fmt::Debug for FallbackCondvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Acquire);
        f.debug_struct("FallbackCondvar")
            .field("sleepers", &(state & SLEEPERS_COUNT_MASK))
            .field("wakeup_mode", &(state & WAKEUP_MODE_MASK))
            .field("entry_gate", &self.entry_gate)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
    use core::time::Duration;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::{FallbackCondvar, SLEEPERS_COUNT_MASK, WAKEUP_MODE_ALL, WAKEUP_MODE_ONE};
    use crate::sync::Mutex;
    use crate::sync::condvar::RawCondvar;
    use crate::utils::WakeEvent;

    fn sleepers(cv: &FallbackCondvar) -> u32 {
        cv.state.load(SeqCst) & SLEEPERS_COUNT_MASK
    }

    // Spins until `n` sleepers are registered.
    fn await_sleepers(cv: &FallbackCondvar, n: u32) {
        while sleepers(cv) != n {
            thread::yield_now();
        }
    }

    #[test]
    fn wakeup_without_sleepers_leaves_no_trace() {
        let cv = FallbackCondvar::new();
        cv.signal();
        assert!(cv.is_quiescent());
        cv.broadcast();
        assert!(cv.is_quiescent());

        // The dropped wakeups did not latch.
        let m = Mutex::ready();
        m.lock();
        assert!(!cv.wait(&m, Some(Duration::ZERO)));
        m.unlock();
        assert!(cv.is_quiescent());
    }

    #[test]
    fn signal_wakes_exactly_one() {
        const N: u32 = 4;
        let cv = Arc::new(FallbackCondvar::new());
        let m = Arc::new(Mutex::ready());
        let woken = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let (cv, m, woken, stop) = (cv.clone(), m.clone(), woken.clone(), stop.clone());
                thread::spawn(move || {
                    m.lock();
                    if cv.wait(&m, None) {
                        woken.fetch_add(1, SeqCst);
                    }
                    m.unlock();
                    while !stop.load(SeqCst) {
                        thread::yield_now();
                    }
                })
            })
            .collect();

        await_sleepers(&cv, N);
        cv.signal();
        while woken.load(SeqCst) == 0 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(woken.load(SeqCst), 1);
        assert_eq!(sleepers(&cv), N - 1);
        assert_eq!(cv.entry_gate.available(), 1);

        cv.broadcast();
        stop.store(true, SeqCst);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(woken.load(SeqCst), N as usize);
        assert!(cv.is_quiescent());
    }

    #[test]
    fn broadcast_gate_closes_after_last_sleeper() {
        const N: u32 = 6;
        let cv = Arc::new(FallbackCondvar::new());
        let m = Arc::new(Mutex::ready());

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let (cv, m) = (cv.clone(), m.clone());
                thread::spawn(move || {
                    m.lock();
                    // Mix indefinite and timed sleepers in one broadcast.
                    let woken = if i % 2 == 0 {
                        cv.wait(&m, None)
                    } else {
                        cv.wait(&m, Some(Duration::from_secs(30)))
                    };
                    m.unlock();
                    woken
                })
            })
            .collect();

        await_sleepers(&cv, N);
        cv.broadcast();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert!(cv.is_quiescent());
    }

    #[test]
    fn timed_out_last_sleeper_waits_for_the_pending_event() {
        let cases = [
            (WAKEUP_MODE_ONE, WakeEvent::One),
            (WAKEUP_MODE_ALL, WakeEvent::All),
        ];
        for (mode, event) in cases {
            let cv = Arc::new(FallbackCondvar::new());

            // A registered sleeper whose wait has already timed out.
            cv.entry_gate.acquire();
            cv.state.fetch_add(1, SeqCst);
            cv.entry_gate.release();

            // A wakeup that has published its mode, but not set its event yet.
            cv.entry_gate.acquire();
            cv.state.fetch_add(mode, SeqCst);

            let sleeper = {
                let cv = cv.clone();
                thread::spawn(move || cv.leave(None, true))
            };

            thread::sleep(Duration::from_millis(50));
            assert!(!sleeper.is_finished());
            assert_eq!(cv.entry_gate.available(), 0);

            cv.events.set(event);
            sleeper.join().unwrap();

            assert!(cv.is_quiescent());
            assert!(!cv.events.is_set(WakeEvent::One));
            assert!(!cv.events.is_set(WakeEvent::All));
        }
    }

    #[test]
    fn zero_timeouts_against_many_signalers() {
        const SIGNALERS: usize = 4;
        const RUN_FOR: Duration = Duration::from_secs(2);

        let waiters = thread::available_parallelism().map_or(8, |n| n.get()) * 2 + 2;
        let cv = Arc::new(FallbackCondvar::new());
        let m = Arc::new(Mutex::ready());
        let stop = Arc::new(AtomicBool::new(false));

        let waiting: Vec<_> = (0..waiters)
            .map(|i| {
                let (cv, m, stop) = (cv.clone(), m.clone(), stop.clone());
                thread::spawn(move || {
                    let timeout = if i % 2 == 0 {
                        Duration::ZERO
                    } else {
                        Duration::from_micros(500)
                    };
                    while !stop.load(SeqCst) {
                        m.lock();
                        cv.wait(&m, Some(timeout));
                        m.unlock();
                    }
                })
            })
            .collect();

        let signaling: Vec<_> = (0..SIGNALERS)
            .map(|i| {
                let (cv, stop) = (cv.clone(), stop.clone());
                thread::spawn(move || {
                    let mut broadcast = i % 2 == 0;
                    while !stop.load(SeqCst) {
                        if broadcast {
                            cv.broadcast();
                        } else {
                            cv.signal();
                        }
                        broadcast = !broadcast;
                    }
                })
            })
            .collect();

        let start = Instant::now();
        while start.elapsed() < RUN_FOR {
            thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, SeqCst);

        for h in waiting.into_iter().chain(signaling) {
            h.join().unwrap();
        }
        assert!(cv.is_quiescent());
    }

    #[test]
    fn timeouts_racing_signals_stay_consistent() {
        const N: usize = 8;
        const ROUNDS: usize = 200;
        let cv = Arc::new(FallbackCondvar::new());
        let m = Arc::new(Mutex::ready());

        let waiters: Vec<_> = (0..N)
            .map(|_| {
                let (cv, m) = (cv.clone(), m.clone());
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        m.lock();
                        cv.wait(&m, Some(Duration::ZERO));
                        m.unlock();
                    }
                })
            })
            .collect();

        let signaler = {
            let cv = cv.clone();
            thread::spawn(move || {
                for i in 0..ROUNDS * N {
                    if i % 3 == 0 {
                        cv.broadcast();
                    } else {
                        cv.signal();
                    }
                }
            })
        };

        for h in waiters {
            h.join().unwrap();
        }
        signaler.join().unwrap();
        assert!(cv.is_quiescent());
    }
}
