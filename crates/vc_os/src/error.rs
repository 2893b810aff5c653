//! Error tiers.
//!
//! Running out of an OS resource while creating a primitive is reported as an
//! [`InitError`] and left to the caller.
//!
//! Breaking a primitive's contract is fatal: the violation is logged at
//! `error` level and the calling thread panics. There is no way to recover a
//! lock or condition variable whose state is no longer known to be
//! consistent.

use std::io;

use thiserror::Error;

// -----------------------------------------------------------------------------
// InitError

/// A primitive could not acquire the OS resources it needs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitError {
    /// The OS refused to create a thread.
    #[error("failed to spawn an OS thread: {0}")]
    Spawn(#[from] io::Error),
}

// -----------------------------------------------------------------------------
// fatal

/// Reports a contract violation and panics.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        ::log::error!($($arg)+);
        ::core::panic!($($arg)+)
    }};
}

/// Like [`fatal!`], but only logs when the thread is already unwinding.
///
/// For destructors: a second panic would abort and drop the first message.
macro_rules! fatal_in_drop {
    ($($arg:tt)+) => {{
        if ::std::thread::panicking() {
            ::log::error!($($arg)+);
        } else {
            fatal!($($arg)+);
        }
    }};
}
