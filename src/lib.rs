//! Blocking concurrency primitives for OS threads.
//!
//! The primitives live in [`os`]; the common ones are re-exported here.
//!
//! ```
//! use vc_threading::{Monitor, Thread};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let monitor = Arc::new(Monitor::new().unwrap());
//! let jobs = Arc::new(AtomicUsize::new(0));
//!
//! let mut worker = Thread::new().with_name("worker");
//! let (m, j) = (monitor.clone(), jobs.clone());
//! worker
//!     .start(move || {
//!         let mut guard = m.lock();
//!         guard.wait_while(|| j.load(Ordering::Relaxed) == 0);
//!         j.fetch_sub(1, Ordering::Relaxed);
//!     })
//!     .unwrap();
//!
//! {
//!     let guard = monitor.lock();
//!     jobs.fetch_add(1, Ordering::Relaxed);
//!     guard.notify();
//! }
//! worker.join();
//! assert_eq!(jobs.load(Ordering::Relaxed), 0);
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use vc_os as os;

pub use vc_os::InitError;
pub use vc_os::sync::{
    Backend, ConditionVariable, Monitor, MonitorGuard, Mutex, MutexGuard, Once, WaitTimeoutResult,
};
pub use vc_os::thread::{Thread, ThreadId, ThreadState};
