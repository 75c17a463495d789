//! Wildcard bind rewriting: classify, copy metadata, resolve, merge.

use tracing::warn;

use crate::address::SocketAddress;
use crate::diagnostics::{RewriteHook, TracingHook};
use crate::error::RewriteError;
use crate::resolver::PublicIpResolver;

/// Outcome of [`Rewriter::maybe_rewrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Bind to the caller's address as given.
    PassThrough,
    /// Bind to this address instead.
    Rewritten(SocketAddress),
}

/// Turns wildcard bind targets into the node's public address.
///
/// The resolver is consulted on every wildcard call; results are not cached.
#[derive(Debug, Clone)]
pub struct Rewriter<R, H = TracingHook> {
    resolver: R,
    hook: H,
}

impl<R: PublicIpResolver> Rewriter<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            hook: TracingHook,
        }
    }
}

impl<R, H> Rewriter<R, H> {
    /// Replace the rewrite observer.
    pub fn with_hook<H2: RewriteHook>(self, hook: H2) -> Rewriter<R, H2> {
        Rewriter {
            resolver: self.resolver,
            hook,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R: PublicIpResolver, H: RewriteHook> Rewriter<R, H> {
    /// Decide what `addr` should actually be bound to.
    ///
    /// Unsupported families pass through with a warning. A resolution failure
    /// is an error; no partially built address is ever returned.
    pub fn maybe_rewrite(&self, addr: &SocketAddress) -> Result<Rewrite, RewriteError> {
        match addr.is_wildcard() {
            Ok(true) => {}
            Ok(false) => return Ok(Rewrite::PassThrough),
            Err(unsupported) => {
                warn!(family = unsupported.0, "{unsupported}, binding unmodified");
                return Ok(Rewrite::PassThrough);
            }
        }

        let partial = addr.copy_metadata().map_err(RewriteError::MetadataCopy)?;
        let ip = self.resolver.resolve_public_ip(partial.family())?;
        let rewritten = partial.fill(ip)?;

        self.hook.on_rewrite(addr, &rewritten);
        Ok(Rewrite::Rewritten(rewritten))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFamily;
    use crate::diagnostics::NoopHook;
    use crate::resolver::ResolveError;
    use assert_matches::assert_matches;
    use std::cell::{Cell, RefCell};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    const PUBLIC_V4: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

    fn public_v6() -> Ipv6Addr {
        "2001:db8::7".parse().unwrap()
    }

    /// Answers with fixed addresses and counts lookups.
    #[derive(Default)]
    struct FixedResolver {
        calls: Cell<usize>,
        fail: bool,
        wrong_family: bool,
    }

    impl PublicIpResolver for FixedResolver {
        fn resolve_public_ip(&self, family: AddressFamily) -> Result<IpAddr, ResolveError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(ResolveError::NoAddress);
            }
            let family = match (family, self.wrong_family) {
                (AddressFamily::Inet, false) | (AddressFamily::Inet6, true) => AddressFamily::Inet,
                _ => AddressFamily::Inet6,
            };
            Ok(match family {
                AddressFamily::Inet => IpAddr::V4(PUBLIC_V4),
                AddressFamily::Inet6 => IpAddr::V6(public_v6()),
            })
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        seen: RefCell<Vec<(SocketAddress, SocketAddress)>>,
    }

    impl RewriteHook for RecordingHook {
        fn on_rewrite(&self, before: &SocketAddress, after: &SocketAddress) {
            self.seen.borrow_mut().push((*before, *after));
        }
    }

    #[test]
    fn test_rewrites_ipv4_wildcard() {
        let rewriter = Rewriter::new(FixedResolver::default());
        let addr = SocketAddress::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9000));

        assert_eq!(
            rewriter.maybe_rewrite(&addr).unwrap(),
            Rewrite::Rewritten(SocketAddress::V4(SocketAddrV4::new(PUBLIC_V4, 9000)))
        );
        assert_eq!(rewriter.resolver().calls.get(), 1);
    }

    #[test]
    fn test_rewrites_ipv6_wildcard_keeping_metadata() {
        let rewriter = Rewriter::new(FixedResolver::default());
        let addr = SocketAddress::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 443, 0xabcde, 4));

        assert_eq!(
            rewriter.maybe_rewrite(&addr).unwrap(),
            Rewrite::Rewritten(SocketAddress::V6(SocketAddrV6::new(public_v6(), 443, 0xabcde, 4)))
        );
    }

    #[test]
    fn test_specific_address_skips_resolution() {
        let rewriter = Rewriter::new(FixedResolver::default());
        let addr = SocketAddress::V4("192.168.1.5:8080".parse().unwrap());

        assert_eq!(rewriter.maybe_rewrite(&addr).unwrap(), Rewrite::PassThrough);
        assert_eq!(rewriter.resolver().calls.get(), 0);
    }

    #[test]
    fn test_unsupported_family_passes_through() {
        let rewriter = Rewriter::new(FixedResolver::default());
        let addr = SocketAddress::Unsupported(libc::AF_UNIX as libc::sa_family_t);

        assert_eq!(rewriter.maybe_rewrite(&addr).unwrap(), Rewrite::PassThrough);
        assert_eq!(rewriter.resolver().calls.get(), 0);
    }

    #[test]
    fn test_resolution_failure_is_an_error() {
        let rewriter = Rewriter::new(FixedResolver {
            fail: true,
            ..Default::default()
        });
        let addr = SocketAddress::V4("0.0.0.0:9000".parse().unwrap());

        let err = rewriter.maybe_rewrite(&addr).unwrap_err();
        assert_matches!(err, RewriteError::Resolution(ResolveError::NoAddress));
        assert_eq!(err.errno(), libc::EINVAL);
    }

    #[test]
    fn test_resolved_family_mismatch_is_an_error() {
        let rewriter = Rewriter::new(FixedResolver {
            wrong_family: true,
            ..Default::default()
        });
        let addr = SocketAddress::V4("0.0.0.0:9000".parse().unwrap());

        assert_matches!(
            rewriter.maybe_rewrite(&addr),
            Err(RewriteError::Resolution(ResolveError::UnexpectedFamily { .. }))
        );
    }

    #[test]
    fn test_repeated_rewrites_resolve_each_time() {
        let rewriter = Rewriter::new(FixedResolver::default()).with_hook(NoopHook);
        let addr = SocketAddress::V4("0.0.0.0:80".parse().unwrap());

        let first = rewriter.maybe_rewrite(&addr).unwrap();
        let second = rewriter.maybe_rewrite(&addr).unwrap();

        assert_eq!(first, second);
        assert_eq!(rewriter.resolver().calls.get(), 2);
    }

    #[test]
    fn test_hook_sees_each_rewrite() {
        let hook = RecordingHook::default();
        let rewriter = Rewriter::new(FixedResolver::default()).with_hook(&hook);

        let wildcard = SocketAddress::V4("0.0.0.0:80".parse().unwrap());
        rewriter.maybe_rewrite(&wildcard).unwrap();
        rewriter
            .maybe_rewrite(&SocketAddress::V4("10.0.0.1:80".parse().unwrap()))
            .unwrap();

        let seen = hook.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen.first(),
            Some(&(wildcard, SocketAddress::V4(SocketAddrV4::new(PUBLIC_V4, 80))))
        );
    }
}
