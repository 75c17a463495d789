//! Access to the calling thread's `errno`.

use std::io;

use libc::c_int;

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox"))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__error() }
}

#[cfg(any(target_os = "android", target_os = "openbsd", target_os = "netbsd"))]
unsafe fn errno_location() -> *mut c_int {
    unsafe { libc::__errno() }
}

/// Set `errno` for the calling thread.
pub fn set_errno(code: c_int) {
    // SAFETY: the errno location is a valid thread-local int for the thread's lifetime.
    unsafe { *errno_location() = code };
}

/// Current `errno` of the calling thread.
pub fn last_errno() -> c_int {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
