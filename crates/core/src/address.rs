//! Socket address model used by the rewrite pipeline.
//!
//! [`SocketAddress`] is the tagged view of a caller's `struct sockaddr`. Only
//! IPv4 and IPv6 carry an IP; every other family is kept opaque as
//! [`SocketAddress::Unsupported`] so it can be handed back to the real `bind`
//! unchanged.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use libc::{c_int, sa_family_t, socklen_t};

use crate::error::UnsupportedFamily;
use crate::resolver::ResolveError;

/// The two address families the rewriter knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// `AF_INET`
    Inet,
    /// `AF_INET6`
    Inet6,
}

impl AddressFamily {
    /// Platform `sa_family_t` value.
    pub const fn raw(self) -> sa_family_t {
        match self {
            Self::Inet => libc::AF_INET as sa_family_t,
            Self::Inet6 => libc::AF_INET6 as sa_family_t,
        }
    }

    /// Value suitable for `addrinfo.ai_family`.
    pub const fn ai_family(self) -> c_int {
        match self {
            Self::Inet => libc::AF_INET,
            Self::Inet6 => libc::AF_INET6,
        }
    }

    /// Family of an IP value.
    pub const fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

impl TryFrom<sa_family_t> for AddressFamily {
    type Error = UnsupportedFamily;

    fn try_from(family: sa_family_t) -> Result<Self, Self::Error> {
        match c_int::from(family) {
            libc::AF_INET => Ok(Self::Inet),
            libc::AF_INET6 => Ok(Self::Inet6),
            _ => Err(UnsupportedFamily(family)),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("IPv4"),
            Self::Inet6 => f.write_str("IPv6"),
        }
    }
}

/// A requested bind target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketAddress {
    V4(SocketAddrV4),
    /// Flow-info and scope-id travel with the address.
    V6(SocketAddrV6),
    /// Any other family, identified by its raw discriminator.
    Unsupported(sa_family_t),
}

impl SocketAddress {
    /// The address family, or [`UnsupportedFamily`] for anything but IPv4/IPv6.
    pub fn family(&self) -> Result<AddressFamily, UnsupportedFamily> {
        match self {
            Self::V4(_) => Ok(AddressFamily::Inet),
            Self::V6(_) => Ok(AddressFamily::Inet6),
            Self::Unsupported(family) => Err(UnsupportedFamily(*family)),
        }
    }

    /// The raw `sa_family_t` discriminator.
    pub fn raw_family(&self) -> sa_family_t {
        match self {
            Self::V4(_) => AddressFamily::Inet.raw(),
            Self::V6(_) => AddressFamily::Inet6.raw(),
            Self::Unsupported(family) => *family,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::V4(addr) => Some(IpAddr::V4(*addr.ip())),
            Self::V6(addr) => Some(IpAddr::V6(*addr.ip())),
            Self::Unsupported(_) => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::V4(addr) => Some(addr.port()),
            Self::V6(addr) => Some(addr.port()),
            Self::Unsupported(_) => None,
        }
    }

    /// Whether this is `0.0.0.0` or `::`.
    ///
    /// Only the all-zero address counts; `::ffff:0.0.0.0` is a regular IPv6
    /// address.
    pub fn is_wildcard(&self) -> Result<bool, UnsupportedFamily> {
        match self {
            Self::V4(addr) => Ok(*addr.ip() == Ipv4Addr::UNSPECIFIED),
            Self::V6(addr) => Ok(*addr.ip() == Ipv6Addr::UNSPECIFIED),
            Self::Unsupported(family) => Err(UnsupportedFamily(*family)),
        }
    }

    /// Everything but the IP, ready to receive a resolved address.
    pub fn copy_metadata(&self) -> Result<PartialAddress, UnsupportedFamily> {
        match self {
            Self::V4(addr) => Ok(PartialAddress::V4 { port: addr.port() }),
            Self::V6(addr) => Ok(PartialAddress::V6 {
                port: addr.port(),
                flowinfo: addr.flowinfo(),
                scope_id: addr.scope_id(),
            }),
            Self::Unsupported(family) => Err(UnsupportedFamily(*family)),
        }
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4(v4),
            SocketAddr::V6(v6) => Self::V6(v6),
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(addr) => addr.fmt(f),
            Self::V6(addr) => addr.fmt(f),
            Self::Unsupported(family) => write!(f, "<family {family}>"),
        }
    }
}

/// A rewritten address before its IP is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialAddress {
    V4 {
        port: u16,
    },
    V6 {
        port: u16,
        flowinfo: u32,
        scope_id: u32,
    },
}

impl PartialAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4 { .. } => AddressFamily::Inet,
            Self::V6 { .. } => AddressFamily::Inet6,
        }
    }

    /// Complete the address with a resolved IP of the same family.
    pub fn fill(self, ip: IpAddr) -> Result<SocketAddress, ResolveError> {
        match (self, ip) {
            (Self::V4 { port }, IpAddr::V4(ip)) => Ok(SocketAddress::V4(SocketAddrV4::new(ip, port))),
            (
                Self::V6 {
                    port,
                    flowinfo,
                    scope_id,
                },
                IpAddr::V6(ip),
            ) => Ok(SocketAddress::V6(SocketAddrV6::new(ip, port, flowinfo, scope_id))),
            (partial, ip) => Err(ResolveError::UnexpectedFamily {
                requested: partial.family(),
                got: AddressFamily::of(&ip),
            }),
        }
    }
}

/// Arguments of one intercepted `bind` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRequest {
    pub fd: c_int,
    pub address: SocketAddress,
    pub len: socklen_t,
}
