#![cfg_attr(docsrs, feature(doc_cfg))]

//! Blocking concurrency primitives for OS threads.
//!
//! - [`sync::Mutex`] : a non-reentrant exclusive lock with explicit
//!   `lock`/`unlock` and a scoped [`sync::MutexGuard`].
//! - [`sync::ConditionVariable`] : wait / signal / broadcast with optional
//!   timeout, backed either by the platform condition variable or by a
//!   fallback built from a semaphore and two wake events.
//! - [`sync::Once`] : a retryable run-once gate.
//! - [`sync::Monitor`] : one lock plus one condition variable behind the
//!   wait / notify protocol.
//! - [`thread::Thread`] : OS threads with process-unique [`thread::ThreadId`]s.
//!
//! Every operation blocks the calling OS thread. Misuse of a primitive
//! (locking an uninitialized mutex, joining a thread twice, ...) is fatal,
//! see [`error`].

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

#[macro_use]
pub mod error;

pub mod sync;
pub mod thread;
pub mod utils;

// -----------------------------------------------------------------------------
// Exports

pub use error::InitError;
