//! Locating the C library's `bind`.
//!
//! The lookup happens once per process and its outcome, success or failure,
//! is kept for every later call.

use std::ffi::{CStr, c_void};
use std::mem;

use bindpub_core::RealBind;
use libc::{c_int, sockaddr, socklen_t};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::debug;

type BindFn = unsafe extern "C" fn(c_int, *const sockaddr, socklen_t) -> c_int;

#[cfg(target_os = "linux")]
const LIBC: &CStr = c"libc.so.6";
#[cfg(target_vendor = "apple")]
const LIBC: &CStr = c"/usr/lib/libSystem.B.dylib";
#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
const LIBC: &CStr = c"libc.so";

const SYMBOL: &CStr = c"bind";

static REAL_BIND: OnceCell<Result<LibcBind, SetupError>> = OnceCell::new();

#[derive(Debug, Clone, Error)]
pub enum SetupError {
    #[error("cannot load {library}: {reason}")]
    Load { library: String, reason: String },

    #[error("{library} has no `bind`: {reason}")]
    Symbol { library: String, reason: String },
}

/// Where the real `bind` was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Next definition after this library in symbol lookup order.
    Next,
    /// Explicitly loaded C library.
    Library(&'static CStr),
}

/// The C library's `bind`.
#[derive(Debug, Clone, Copy)]
pub struct LibcBind {
    bind: BindFn,
    origin: Origin,
}

impl LibcBind {
    /// The process-wide real `bind`, located on first use.
    pub fn get() -> Result<&'static Self, SetupError> {
        REAL_BIND.get_or_init(Self::locate).as_ref().map_err(Clone::clone)
    }

    /// Look up `bind` past this library, falling back to loading the C library.
    pub fn locate() -> Result<Self, SetupError> {
        // SAFETY: RTLD_NEXT lookup of a NUL-terminated name.
        let next = unsafe { libc::dlsym(libc::RTLD_NEXT, SYMBOL.as_ptr()) };
        // Resolving to ourselves would recurse forever.
        if !next.is_null() && next as usize != crate::bind as BindFn as usize {
            debug!("using next bind in lookup order");
            return Ok(Self {
                // SAFETY: `bind` has this signature in every C library.
                bind: unsafe { mem::transmute::<*mut c_void, BindFn>(next) },
                origin: Origin::Next,
            });
        }

        Self::from_library(LIBC)
    }

    /// Load `library` and take its `bind`.
    ///
    /// On success the library stays loaded for the rest of the process.
    pub fn from_library(library: &'static CStr) -> Result<Self, SetupError> {
        // SAFETY: NUL-terminated library name.
        let handle = unsafe { libc::dlopen(library.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(SetupError::Load {
                library: library.to_string_lossy().into_owned(),
                reason: dlerror(),
            });
        }

        // SAFETY: `handle` is a live dlopen handle.
        let symbol = unsafe { libc::dlsym(handle, SYMBOL.as_ptr()) };
        if symbol.is_null() {
            let reason = dlerror();
            // SAFETY: nothing from `handle` is kept.
            unsafe { libc::dlclose(handle) };
            return Err(SetupError::Symbol {
                library: library.to_string_lossy().into_owned(),
                reason,
            });
        }

        debug!(library = %library.to_string_lossy(), "using bind from explicitly loaded library");
        Ok(Self {
            // SAFETY: as in `locate`.
            bind: unsafe { mem::transmute::<*mut c_void, BindFn>(symbol) },
            origin: Origin::Library(library),
        })
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

impl RealBind for LibcBind {
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.bind)(fd, addr, len) }
    }
}

fn dlerror() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated message.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown error".to_owned();
    }
    // SAFETY: checked non-null above.
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_finds_bind() {
        let real = LibcBind::locate().unwrap();
        assert_ne!(real.bind as usize, crate::bind as BindFn as usize);
    }

    #[test]
    fn test_get_is_memoized() {
        let first = LibcBind::get().unwrap();
        let second = LibcBind::get().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_explicit_library() {
        let real = LibcBind::from_library(LIBC).unwrap();
        assert_eq!(real.origin(), Origin::Library(LIBC));
    }

    #[test]
    fn test_missing_library() {
        let err = LibcBind::from_library(c"libbindpub-does-not-exist.so").unwrap_err();
        assert!(matches!(err, SetupError::Load { .. }));
        assert!(err.to_string().starts_with("cannot load libbindpub-does-not-exist.so: "));
    }
}
