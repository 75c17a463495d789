//! Conversion between C `sockaddr` structures and [`SocketAddress`].
//!
//! Ports are network byte order on the wire and host order in
//! [`SocketAddress`]. IPv6 flow-info and scope-id are copied bit for bit.

use std::mem::{self, offset_of, size_of};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::{ptr, slice};

use libc::{c_int, sa_family_t, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use thiserror::Error;

use crate::address::{BindRequest, SocketAddress};
use crate::error::UnsupportedFamily;

/// A caller-supplied `sockaddr` that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RawAddressError {
    #[error("null socket address")]
    Null,

    #[error("socket address of family {family} is {len} bytes, need {need}")]
    Truncated {
        family: sa_family_t,
        len: socklen_t,
        need: usize,
    },

    #[error("socket address length {len} exceeds {max}")]
    Oversized { len: socklen_t, max: usize },
}

/// Bytes needed to read `sa_family`.
const FAMILY_END: usize = offset_of!(sockaddr, sa_family) + size_of::<sa_family_t>();

/// RFC 2133 `sockaddr_in6`, which ends before `sin6_scope_id`.
pub const SIN6_LEN_RFC2133: usize = offset_of!(sockaddr_in6, sin6_scope_id);

impl SocketAddress {
    /// Decode a `struct sockaddr` of `len` bytes.
    ///
    /// Never reads past `len`. Families other than IPv4/IPv6 only have their
    /// discriminator read. IPv6 addresses in the RFC 2133 layout decode with a
    /// zero scope-id. IPv4/IPv6 lengths beyond `sockaddr_storage` are rejected.
    ///
    /// # Safety
    ///
    /// A non-null `addr` must be valid for reads of `len` bytes.
    pub unsafe fn from_raw(addr: *const sockaddr, len: socklen_t) -> Result<Self, RawAddressError> {
        if addr.is_null() {
            return Err(RawAddressError::Null);
        }
        let available = len as usize;
        if available < FAMILY_END {
            return Err(RawAddressError::Truncated {
                family: 0,
                len,
                need: FAMILY_END,
            });
        }

        // SAFETY: the family field lies within the first `len` bytes.
        let family = unsafe { ptr::addr_of!((*addr).sa_family).read_unaligned() };
        let need = match c_int::from(family) {
            libc::AF_INET => size_of::<sockaddr_in>(),
            libc::AF_INET6 => SIN6_LEN_RFC2133,
            _ => return Ok(Self::Unsupported(family)),
        };
        if available > size_of::<sockaddr_storage>() {
            return Err(RawAddressError::Oversized {
                len,
                max: size_of::<sockaddr_storage>(),
            });
        }
        if available < need {
            return Err(RawAddressError::Truncated { family, len, need });
        }

        match c_int::from(family) {
            libc::AF_INET => {
                // SAFETY: length checked against `sockaddr_in` above.
                let sin = unsafe { addr.cast::<sockaddr_in>().read_unaligned() };
                Ok(Self::V4(SocketAddrV4::new(
                    Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
                    u16::from_be(sin.sin_port),
                )))
            }
            _ => {
                // SAFETY: all-zero is a valid `sockaddr_in6`.
                let mut sin6: sockaddr_in6 = unsafe { mem::zeroed() };
                let copied = available.min(size_of::<sockaddr_in6>());
                // SAFETY: `copied` bytes are readable from `addr` and fit in `sin6`.
                unsafe {
                    ptr::copy_nonoverlapping(
                        addr.cast::<u8>(),
                        ptr::addr_of_mut!(sin6).cast::<u8>(),
                        copied,
                    )
                };
                Ok(Self::V6(SocketAddrV6::new(
                    Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
        }
    }
}

impl BindRequest {
    /// Decode the arguments of an intercepted `bind`.
    ///
    /// # Safety
    ///
    /// Same contract as [`SocketAddress::from_raw`].
    pub unsafe fn from_raw(
        fd: c_int,
        addr: *const sockaddr,
        len: socklen_t,
    ) -> Result<Self, RawAddressError> {
        // SAFETY: forwarded caller contract.
        let address = unsafe { SocketAddress::from_raw(addr, len) }?;
        Ok(Self { fd, address, len })
    }
}

/// An owned, zero-initialized C encoding of an IPv4 or IPv6 address.
#[derive(Clone, Copy)]
pub struct RawSocketAddress {
    storage: sockaddr_storage,
    len: socklen_t,
}

impl RawSocketAddress {
    /// Encode `addr`; unsupported families have no encoding.
    pub fn encode(addr: &SocketAddress) -> Result<Self, UnsupportedFamily> {
        // SAFETY: all-zero is a valid `sockaddr_storage`.
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

        let len = match addr {
            SocketAddress::V4(v4) => {
                // SAFETY: `sockaddr_storage` is large and aligned enough for any sockaddr.
                let sin = unsafe { &mut *ptr::addr_of_mut!(storage).cast::<sockaddr_in>() };
                sin.sin_family = libc::AF_INET as sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
                #[cfg(any(
                    target_os = "macos",
                    target_os = "ios",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                ))]
                {
                    sin.sin_len = size_of::<sockaddr_in>() as u8;
                }
                size_of::<sockaddr_in>()
            }
            SocketAddress::V6(v6) => {
                // SAFETY: as above.
                let sin6 = unsafe { &mut *ptr::addr_of_mut!(storage).cast::<sockaddr_in6>() };
                sin6.sin6_family = libc::AF_INET6 as sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                sin6.sin6_scope_id = v6.scope_id();
                #[cfg(any(
                    target_os = "macos",
                    target_os = "ios",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                ))]
                {
                    sin6.sin6_len = size_of::<sockaddr_in6>() as u8;
                }
                size_of::<sockaddr_in6>()
            }
            SocketAddress::Unsupported(family) => return Err(UnsupportedFamily(*family)),
        };

        Ok(Self {
            storage,
            len: len as socklen_t,
        })
    }

    pub fn as_ptr(&self) -> *const sockaddr {
        ptr::addr_of!(self.storage).cast()
    }

    /// Size of the encoded structure (`sockaddr_in` or `sockaddr_in6`).
    pub fn socklen(&self) -> socklen_t {
        self.len
    }

    /// The encoded structure as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `len` never exceeds the size of `storage`.
        unsafe { slice::from_raw_parts(ptr::addr_of!(self.storage).cast::<u8>(), self.len as usize) }
    }
}

impl std::fmt::Debug for RawSocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSocketAddress")
            .field("family", &self.storage.ss_family)
            .field("len", &self.len)
            .finish()
    }
}
