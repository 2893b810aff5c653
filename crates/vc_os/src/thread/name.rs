//! Best-effort OS-level naming of the calling thread.

use alloc::ffi::CString;
use alloc::vec::Vec;

/// Linux limits names to 16 bytes including the terminator; the same limit
/// is applied everywhere so a name reads the same on every platform.
const MAX_NAME_LEN: usize = 15;

/// Names the calling thread, returning whether the platform supports it.
pub(super) fn set_current(name: &str) -> bool {
    let name = to_c_name(name);
    let applied = platform::set_current(&name);
    if !applied {
        log::warn!("thread naming is not supported here, {name:?} was not applied");
    }
    applied
}

/// The part of `name` before its first NUL byte.
pub(super) fn until_nul(name: &str) -> &str {
    match name.find('\0') {
        Some(end) => {
            log::warn!("thread name {name:?} contains a NUL byte and was truncated");
            &name[..end]
        }
        None => name,
    }
}

fn to_c_name(name: &str) -> CString {
    let mut bytes: Vec<u8> = until_nul(name).as_bytes().to_vec();
    bytes.truncate(MAX_NAME_LEN);
    // No NUL can remain in `bytes`.
    CString::new(bytes).unwrap_or_default()
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use core::ffi::CStr;

    #[expect(unsafe_code, reason = "prctl is a C API.")]
    pub(super) fn set_current(name: &CStr) -> bool {
        // SAFETY: `name` is NUL-terminated and outlives the call, the kernel
        // copies it. The remaining arguments are ignored by PR_SET_NAME.
        let r = unsafe {
            libc::prctl(
                libc::PR_SET_NAME,
                name.as_ptr() as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            )
        };
        r == 0
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod platform {
    use core::ffi::CStr;

    #[expect(unsafe_code, reason = "pthread_setname_np is a C API.")]
    pub(super) fn set_current(name: &CStr) -> bool {
        // SAFETY: `name` is NUL-terminated and outlives the call.
        unsafe { libc::pthread_setname_np(name.as_ptr()) == 0 }
    }
}

#[cfg(any(target_os = "freebsd", target_os = "openbsd"))]
mod platform {
    use core::ffi::CStr;

    #[expect(unsafe_code, reason = "pthread_set_name_np is a C API.")]
    pub(super) fn set_current(name: &CStr) -> bool {
        // SAFETY: `name` is NUL-terminated and outlives the call, and
        // `pthread_self` is always a valid handle for the calling thread.
        unsafe { libc::pthread_set_name_np(libc::pthread_self(), name.as_ptr()) };
        true
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
)))]
mod platform {
    use core::ffi::CStr;

    pub(super) fn set_current(_name: &CStr) -> bool {
        false
    }
}
