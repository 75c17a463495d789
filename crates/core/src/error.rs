//! Error taxonomy for the rewrite pipeline.

use libc::{c_int, sa_family_t};
use thiserror::Error;

use crate::resolver::ResolveError;

/// No rewriting logic exists for this address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported socket address family {0}")]
pub struct UnsupportedFamily(pub sa_family_t);

/// Why a wildcard bind could not be rewritten.
///
/// Unsupported families are not an error: they pass through with a warning.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The node's public address could not be resolved.
    #[error("public address resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    /// Port/flow-info/scope-id could not be carried over to the new address.
    #[error("cannot copy address metadata: {0}")]
    MetadataCopy(UnsupportedFamily),
}

impl RewriteError {
    /// The errno reported to the caller of `bind` for this failure.
    pub fn errno(&self) -> c_int {
        match self {
            Self::Resolution(_) => libc::EINVAL,
            Self::MetadataCopy(_) => libc::EACCES,
        }
    }
}
