//! Observation of completed rewrites.
//!
//! The rewriter never depends on what a hook does; hooks exist so the
//! before/after pair can be inspected.

use auto_impl::auto_impl;
use tracing::debug;

use crate::address::SocketAddress;

#[auto_impl(&, Box, Arc)]
pub trait RewriteHook {
    /// Called once per rewritten bind, before delegation.
    fn on_rewrite(&self, before: &SocketAddress, after: &SocketAddress);
}

/// Emits `before --> after` as a `debug` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl RewriteHook for TracingHook {
    fn on_rewrite(&self, before: &SocketAddress, after: &SocketAddress) {
        debug!("{before} --> {after}");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl RewriteHook for NoopHook {
    fn on_rewrite(&self, _before: &SocketAddress, _after: &SocketAddress) {}
}
