//! `LD_PRELOAD` shim that rebinds wildcard listeners to the node's public address.
//!
//! ```text
//! LD_PRELOAD=/path/to/libbindpub.so BINDPUB_LOG=debug ./server
//! ```
//!
//! Every `bind` in the process goes through [`bind`]: `0.0.0.0` and `::` are
//! replaced with the first address the hostname resolves to, everything else
//! is forwarded unchanged to the C library.

pub mod real;

use bindpub_core::{BindInterposer, HostnameResolver, RealBind, Rewriter, set_errno};
use libc::{c_int, sockaddr, socklen_t};
use tracing::error;

pub use real::{LibcBind, SetupError};

/// Interposed `bind(2)`.
///
/// Fails with `ENOSYS` when the C library's `bind` cannot be found.
///
/// # Safety
///
/// Same contract as `bind(2)`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bind(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
    bindpub_observability::init_logging_once();

    // SAFETY: caller contract.
    unsafe { bind_with(LibcBind::get(), fd, addr, len) }
}

/// Run the rewriting `bind` on top of `real`, or fail with `ENOSYS` if it
/// could not be set up.
///
/// # Safety
///
/// Same contract as `bind(2)`.
unsafe fn bind_with<B: RealBind>(
    real: Result<B, SetupError>,
    fd: c_int,
    addr: *const sockaddr,
    len: socklen_t,
) -> c_int {
    let real = match real {
        Ok(real) => real,
        Err(err) => {
            error!(%err, "real bind unavailable");
            set_errno(libc::ENOSYS);
            return -1;
        }
    };

    let interposer = BindInterposer::new(Rewriter::new(HostnameResolver), real);
    // SAFETY: caller contract.
    unsafe { interposer.bind(fd, addr, len) }
}
