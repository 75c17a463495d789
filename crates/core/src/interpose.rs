//! Delegation of an intercepted `bind` to the real implementation.

use libc::{c_int, sockaddr, socklen_t};
use tracing::{debug, warn};

use crate::address::BindRequest;
use crate::diagnostics::RewriteHook;
use crate::errno::set_errno;
use crate::error::RewriteError;
use crate::raw::RawSocketAddress;
use crate::resolver::PublicIpResolver;
use crate::rewrite::{Rewrite, Rewriter};

/// The underlying `bind` this crate forwards to.
pub trait RealBind {
    /// Invoke the real `bind`, returning its result and leaving its errno.
    ///
    /// # Safety
    ///
    /// `addr` and `len` are passed through unchecked; the implementation must
    /// accept whatever `bind(2)` accepts.
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int;
}

impl<T: RealBind + ?Sized> RealBind for &T {
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).bind(fd, addr, len) }
    }
}

/// Runs the rewriter in front of a [`RealBind`].
#[derive(Debug, Clone)]
pub struct BindInterposer<R, H, B> {
    rewriter: Rewriter<R, H>,
    real: B,
}

impl<R, H, B> BindInterposer<R, H, B>
where
    R: PublicIpResolver,
    H: RewriteHook,
    B: RealBind,
{
    pub fn new(rewriter: Rewriter<R, H>, real: B) -> Self {
        Self { rewriter, real }
    }

    pub fn rewriter(&self) -> &Rewriter<R, H> {
        &self.rewriter
    }

    pub fn real(&self) -> &B {
        &self.real
    }

    /// `bind(2)` with wildcard addresses replaced by the public address.
    ///
    /// Addresses that are not rewritten reach the real `bind` as the caller's
    /// own pointer. A rewritten address keeps the caller's fd and length. When
    /// the rewrite fails, errno is set and `-1` returned without calling the
    /// real `bind`.
    ///
    /// # Safety
    ///
    /// `addr` must be null or valid for reads of `len` bytes, as for `bind(2)`.
    pub unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        // SAFETY: caller contract.
        let request = match unsafe { BindRequest::from_raw(fd, addr, len) } {
            Ok(request) => request,
            Err(err) => {
                // Let the real bind report EFAULT/EINVAL itself.
                debug!(fd, %err, "undecodable bind address, delegating unmodified");
                // SAFETY: caller contract.
                return unsafe { self.real.bind(fd, addr, len) };
            }
        };

        match self.rewriter.maybe_rewrite(&request.address) {
            // SAFETY: caller contract.
            Ok(Rewrite::PassThrough) => unsafe { self.real.bind(fd, addr, len) },
            Ok(Rewrite::Rewritten(rewritten)) => match RawSocketAddress::encode(&rewritten) {
                // SAFETY: `raw` holds a full sockaddr_storage and `request.len` was
                // bounded by its size during decoding.
                Ok(raw) => unsafe { self.real.bind(request.fd, raw.as_ptr(), request.len) },
                Err(unsupported) => self.fail(&request, RewriteError::MetadataCopy(unsupported)),
            },
            Err(err) => self.fail(&request, err),
        }
    }

    fn fail(&self, request: &BindRequest, err: RewriteError) -> c_int {
        warn!(fd = request.fd, address = %request.address, %err, "refusing wildcard bind");
        set_errno(err.errno());
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressFamily, SocketAddress};
    use crate::errno::last_errno;
    use crate::resolver::ResolveError;
    use std::cell::RefCell;
    use std::net::{IpAddr, Ipv4Addr};
    use std::ptr;

    struct Public;

    impl PublicIpResolver for Public {
        fn resolve_public_ip(&self, _family: AddressFamily) -> Result<IpAddr, ResolveError> {
            Ok(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)))
        }
    }

    /// Records the pointer it was handed and returns a fixed code.
    #[derive(Default)]
    struct PointerRecorder {
        seen: RefCell<Vec<*const sockaddr>>,
    }

    impl RealBind for PointerRecorder {
        unsafe fn bind(&self, _fd: c_int, addr: *const sockaddr, _len: socklen_t) -> c_int {
            self.seen.borrow_mut().push(addr);
            0
        }
    }

    #[test]
    fn test_null_address_reaches_real_bind() {
        let interposer = BindInterposer::new(Rewriter::new(Public), PointerRecorder::default());

        let rc = unsafe { interposer.bind(3, ptr::null(), 16) };

        assert_eq!(rc, 0);
        assert_eq!(*interposer.real().seen.borrow(), vec![ptr::null()]);
    }

    #[test]
    fn test_specific_address_pointer_is_forwarded() {
        let interposer = BindInterposer::new(Rewriter::new(Public), PointerRecorder::default());
        let raw = RawSocketAddress::encode(&SocketAddress::V4("10.1.2.3:80".parse().unwrap()))
            .unwrap();

        unsafe { interposer.bind(3, raw.as_ptr(), raw.socklen()) };

        assert_eq!(*interposer.real().seen.borrow(), vec![raw.as_ptr()]);
    }

    #[test]
    fn test_failure_sets_errno() {
        struct Broken;
        impl PublicIpResolver for Broken {
            fn resolve_public_ip(&self, _: AddressFamily) -> Result<IpAddr, ResolveError> {
                Err(ResolveError::NoAddress)
            }
        }

        let interposer = BindInterposer::new(Rewriter::new(Broken), PointerRecorder::default());
        let raw = RawSocketAddress::encode(&SocketAddress::V4("0.0.0.0:80".parse().unwrap()))
            .unwrap();

        let rc = unsafe { interposer.bind(3, raw.as_ptr(), raw.socklen()) };

        assert_eq!(rc, -1);
        assert_eq!(last_errno(), libc::EINVAL);
        assert!(interposer.real().seen.borrow().is_empty());
    }
}
