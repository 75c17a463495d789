//! Resolution of the node's public IP from its own hostname.

use std::ffi::{CStr, CString};
use std::io;
use std::mem;
use std::net::IpAddr;
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use auto_impl::auto_impl;
use libc::{addrinfo, c_int};
use thiserror::Error;
use tracing::debug;

use crate::address::{AddressFamily, SocketAddress};
use crate::error::UnsupportedFamily;
use crate::raw::RawAddressError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("hostname: {0}")]
    Hostname(#[source] io::Error),

    #[error("getaddrinfo({host}): {message}")]
    Lookup {
        host: String,
        code: c_int,
        message: String,
    },

    #[error("name resolution returned no address")]
    NoAddress,

    #[error("asked for an {requested} address, got {got}")]
    UnexpectedFamily {
        requested: AddressFamily,
        got: AddressFamily,
    },

    #[error(transparent)]
    UnsupportedFamily(#[from] UnsupportedFamily),

    #[error("malformed resolver result: {0}")]
    Malformed(#[from] RawAddressError),
}

/// Source of the address a wildcard bind is rewritten to.
#[auto_impl(&, Box, Arc)]
pub trait PublicIpResolver {
    /// A single IP of `family` for this node.
    fn resolve_public_ip(&self, family: AddressFamily) -> Result<IpAddr, ResolveError>;
}

/// Resolves the system hostname through `getaddrinfo` and takes the first answer.
///
/// Hosts with several addresses get whichever the resolver lists first; no
/// further preference is applied. Nothing is cached between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameResolver;

impl PublicIpResolver for HostnameResolver {
    fn resolve_public_ip(&self, family: AddressFamily) -> Result<IpAddr, ResolveError> {
        let host = hostname()?;
        let results = AddrInfoList::lookup(&host, family)?;
        let ip = first_ip(results.first()?, family)?;

        debug!(host = %host.to_string_lossy(), %ip, %family, "resolved public address");
        Ok(ip)
    }
}

/// The node's configured hostname.
pub fn hostname() -> Result<CString, ResolveError> {
    let name = hostname::get().map_err(ResolveError::Hostname)?;

    CString::new(name.as_bytes())
        .map_err(|e| ResolveError::Hostname(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Pick the IP of `family` from the first resolver answer.
fn first_ip(first: Option<SocketAddress>, family: AddressFamily) -> Result<IpAddr, ResolveError> {
    match (family, first.ok_or(ResolveError::NoAddress)?) {
        (AddressFamily::Inet, SocketAddress::V4(v4)) => Ok(IpAddr::V4(*v4.ip())),
        (AddressFamily::Inet6, SocketAddress::V6(v6)) => Ok(IpAddr::V6(*v6.ip())),
        (requested, other) => Err(ResolveError::UnexpectedFamily {
            requested,
            got: other.family()?,
        }),
    }
}

/// Owned `getaddrinfo` result list, released with `freeaddrinfo` on drop.
struct AddrInfoList {
    head: *mut addrinfo,
}

impl AddrInfoList {
    /// Address-only, canonical-name lookup of `host` restricted to `family`.
    fn lookup(host: &CStr, family: AddressFamily) -> Result<Self, ResolveError> {
        // SAFETY: all-zero is a valid `addrinfo` hints value.
        let mut hints: addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = family.ai_family();
        hints.ai_flags = libc::AI_CANONNAME;

        let mut head = ptr::null_mut();
        // SAFETY: `host` is NUL-terminated, no service is passed, `head` receives the list.
        let rc = unsafe { libc::getaddrinfo(host.as_ptr(), ptr::null(), &hints, &mut head) };
        if rc != 0 {
            return Err(ResolveError::Lookup {
                host: host.to_string_lossy().into_owned(),
                code: rc,
                message: gai_message(rc),
            });
        }

        Ok(Self { head })
    }

    /// The first entry, decoded.
    fn first(&self) -> Result<Option<SocketAddress>, ResolveError> {
        // SAFETY: `head` is null or a live list owned by `self`.
        let Some(entry) = (unsafe { self.head.as_ref() }) else {
            return Ok(None);
        };

        // SAFETY: getaddrinfo guarantees `ai_addr` covers `ai_addrlen` bytes.
        let addr = unsafe { SocketAddress::from_raw(entry.ai_addr, entry.ai_addrlen) }?;
        Ok(Some(addr))
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.head.is_null() {
            // SAFETY: `head` came from a successful getaddrinfo and is freed once.
            unsafe { libc::freeaddrinfo(self.head) };
        }
    }
}

fn gai_message(code: c_int) -> String {
    if code == libc::EAI_SYSTEM {
        return io::Error::last_os_error().to_string();
    }
    // SAFETY: gai_strerror returns a static NUL-terminated string.
    unsafe { CStr::from_ptr(libc::gai_strerror(code)) }
        .to_string_lossy()
        .into_owned()
}
