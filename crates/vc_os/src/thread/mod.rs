//! OS threads with a checked lifecycle and process-unique identity.
//!
//! A [`Thread`] moves through [`ThreadState`]s:
//!
//! ```text
//! NotStarted --start--> Running --join---> Joined
//!                          |
//!                          +----detach---> Detached
//! ```
//!
//! `join` and `detach` are only valid on a running thread, and a running
//! thread must be joined or detached before the [`Thread`] is dropped.
//! Breaking any of these rules is fatal.

mod id;
mod name;

// -----------------------------------------------------------------------------
// Exports

pub use id::ThreadId;

// -----------------------------------------------------------------------------
// Imports

use alloc::string::String;
use std::thread::{self as std_thread, JoinHandle};

use crate::InitError;

// -----------------------------------------------------------------------------
// ThreadState

/// The lifecycle state of a [`Thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Never started.
    NotStarted,
    /// Started and neither joined nor detached yet.
    Running,
    /// The entry function returned and was waited for.
    Joined,
    /// Released without waiting for the entry function.
    Detached,
}

// -----------------------------------------------------------------------------
// Thread

/// An owned OS thread.
///
/// The entry function is an owned closure; whatever it captures is the
/// thread's argument.
///
/// # Examples
///
/// ```
/// use vc_os::thread::{Thread, ThreadId};
/// use std::sync::mpsc::channel;
///
/// let (tx, rx) = channel();
///
/// let mut thread = Thread::new().with_name("worker");
/// thread.start(move || tx.send(ThreadId::current()).unwrap()).unwrap();
///
/// let id = thread.id();
/// assert_eq!(rx.recv().unwrap(), id);
///
/// thread.join();
/// assert!(!thread.running());
/// ```
#[derive(Debug)]
pub struct Thread {
    id: ThreadId,
    handle: Option<JoinHandle<()>>,
    state: ThreadState,
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Thread {
    /// Creates a thread object that has not been started.
    #[inline]
    pub const fn new() -> Self {
        Self {
            id: ThreadId::none(),
            handle: None,
            state: ThreadState::NotStarted,
            name: None,
            stack_size: None,
        }
    }

    /// Sets the name the OS thread is created with.
    ///
    /// A name is cut at its first NUL byte, as with [`Thread::set_name`].
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let mut name = name.into();
        name.truncate(name::until_nul(&name).len());
        self.name = Some(name);
        self
    }

    /// Sets the stack size, in bytes, of the OS thread.
    #[inline]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Spawns an OS thread running `entry`.
    ///
    /// The new thread's id is chosen here, so [`Thread::id`] and
    /// [`Thread::current`] called inside `entry` agree from the first
    /// instruction of `entry` on.
    ///
    /// A thread that was joined or detached may be started again.
    ///
    /// # Errors
    ///
    /// [`InitError::Spawn`] if the OS cannot create the thread. The object
    /// is left as it was.
    ///
    /// # Panics
    ///
    /// If the thread is already running.
    pub fn start<F>(&mut self, entry: F) -> Result<(), InitError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.running() {
            fatal!("thread {} started while it is still running", self.id);
        }

        let id = ThreadId::next();

        let mut builder = std_thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder.spawn(move || {
            ThreadId::set_current(id);
            entry();
        })?;

        log::trace!("thread {id} ({:?}) started", self.name);

        self.id = id;
        self.handle = Some(handle);
        self.state = ThreadState::Running;
        Ok(())
    }

    /// Blocks until the entry function returns.
    ///
    /// If the entry function panicked, the panic is resumed on the calling
    /// thread once the object has become [`ThreadState::Joined`].
    ///
    /// # Panics
    ///
    /// If the thread is not running (never started, or already joined or
    /// detached).
    pub fn join(&mut self) {
        let handle = self.take_running("join");
        let id = self.id;

        let result = handle.join();

        self.id = ThreadId::none();
        self.state = ThreadState::Joined;
        log::trace!("thread {id} joined");

        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }

    /// Releases the OS thread without waiting for it.
    ///
    /// # Panics
    ///
    /// If the thread is not running.
    pub fn detach(&mut self) {
        // Dropping a std handle detaches the OS thread.
        drop(self.take_running("detach"));

        log::trace!("thread {} detached", self.id);
        self.id = ThreadId::none();
        self.state = ThreadState::Detached;
    }

    /// Returns `true` between a successful [`start`](Self::start) and the
    /// matching [`join`](Self::join) or [`detach`](Self::detach).
    #[inline]
    pub fn running(&self) -> bool {
        self.state == ThreadState::Running
    }

    /// The current lifecycle state.
    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// The id of the running thread, [`ThreadId::none`] otherwise.
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The id of the calling thread. See [`ThreadId::current`].
    #[inline]
    pub fn current() -> ThreadId {
        ThreadId::current()
    }

    /// Names the calling thread for debuggers and profilers.
    ///
    /// Returns whether the platform supports naming. Names are cut at 15
    /// bytes and at the first NUL byte.
    pub fn set_name(name: &str) -> bool {
        name::set_current(name)
    }

    fn take_running(&mut self, op: &str) -> JoinHandle<()> {
        match (self.state, self.handle.take()) {
            (ThreadState::Running, Some(handle)) => handle,
            (state, _) => fatal!("cannot {op} a thread in state {state:?}"),
        }
    }
}

impl Default for Thread {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.running() {
            fatal_in_drop!("thread {} dropped while running, join or detach it first", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier, mpsc::channel};

    use super::{Thread, ThreadId, ThreadState};

    #[test]
    fn start_and_join() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut thread = Thread::new();
        assert_eq!(thread.state(), ThreadState::NotStarted);
        assert!(thread.id().is_none());

        let h = hits.clone();
        thread
            .start(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(thread.running());
        assert!(!thread.id().is_none());

        thread.join();
        assert_eq!(thread.state(), ThreadState::Joined);
        assert!(thread.id().is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn creator_and_thread_agree_on_id() {
        let (tx, rx) = channel();
        let mut thread = Thread::new();
        thread
            .start(move || {
                let first = Thread::current();
                let second = Thread::current();
                tx.send((first, second)).unwrap();
            })
            .unwrap();

        let (first, second) = rx.recv().unwrap();
        assert_eq!(first, thread.id());
        assert_eq!(second, thread.id());
        assert_ne!(first, Thread::current());
        thread.join();
    }

    #[test]
    fn live_threads_have_unique_ids() {
        const N: usize = 8;
        let barrier = Arc::new(Barrier::new(N + 1));
        let (tx, rx) = channel();

        let mut threads: Vec<Thread> = (0..N).map(|_| Thread::new()).collect();
        for thread in threads.iter_mut() {
            let barrier = barrier.clone();
            let tx = tx.clone();
            thread
                .start(move || {
                    tx.send(Thread::current()).unwrap();
                    barrier.wait();
                })
                .unwrap();
        }

        let started: HashSet<ThreadId> = threads.iter().map(Thread::id).collect();
        let reported: HashSet<ThreadId> = (0..N).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(started.len(), N);
        assert_eq!(started, reported);
        assert!(!started.contains(&Thread::current()));

        barrier.wait();
        threads.iter_mut().for_each(Thread::join);
    }

    #[test]
    fn restart_after_join_gets_fresh_id() {
        let mut thread = Thread::new();
        thread.start(|| {}).unwrap();
        let first = thread.id();
        thread.join();

        thread.start(|| {}).unwrap();
        assert_ne!(thread.id(), first);
        thread.join();
    }

    #[test]
    fn detach_forgets_the_thread() {
        let (tx, rx) = channel();
        let mut thread = Thread::new().with_name("detached");
        thread
            .start(move || {
                tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
            })
            .unwrap();
        thread.detach();
        assert_eq!(thread.state(), ThreadState::Detached);
        assert!(thread.id().is_none());
        assert_eq!(rx.recv().unwrap().as_deref(), Some("detached"));
    }

    #[test]
    fn builder_name_is_cut_at_nul() {
        let (tx, rx) = channel();
        let mut thread = Thread::new().with_name("io\0worker");
        thread
            .start(move || {
                tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
            })
            .unwrap();
        assert!(thread.running());
        assert_eq!(rx.recv().unwrap().as_deref(), Some("io"));
        thread.join();
    }

    #[test]
    fn join_resumes_entry_panic() {
        let mut thread = Thread::new();
        thread.start(|| panic!("entry failed")).unwrap();

        let result = crate::utils::tests::test_unwind_panic(|| thread.join());
        assert!(result.is_err());
        assert_eq!(thread.state(), ThreadState::Joined);
    }

    #[test]
    #[should_panic(expected = "cannot join a thread in state NotStarted")]
    fn join_not_started_is_fatal() {
        Thread::new().join();
    }

    #[test]
    #[should_panic(expected = "cannot join a thread in state Joined")]
    fn join_twice_is_fatal() {
        let mut thread = Thread::new();
        thread.start(|| {}).unwrap();
        thread.join();
        thread.join();
    }

    #[test]
    #[should_panic(expected = "cannot detach a thread in state Detached")]
    fn detach_twice_is_fatal() {
        let mut thread = Thread::new();
        thread.start(|| {}).unwrap();
        thread.detach();
        thread.detach();
    }

    #[test]
    #[should_panic(expected = "dropped while running")]
    fn drop_running_is_fatal() {
        let mut thread = Thread::new();
        thread.start(|| {}).unwrap();
        drop(thread);
    }
}
