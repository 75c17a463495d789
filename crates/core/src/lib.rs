//! Rewriting of wildcard `bind()` targets to the node's public address.
//!
//! A bind to `0.0.0.0` or `::` is turned into a bind to the first address the
//! node's own hostname resolves to, keeping port, flow-info and scope-id. Any
//! other bind reaches the real implementation untouched.
//!
//! - [`address`] - Socket address model, wildcard classification, metadata copy
//! - [`raw`] - Decoding and encoding of C `sockaddr` structures
//! - [`resolver`] - Hostname based public IP resolution
//! - [`rewrite`] - The classify, copy, resolve, merge pipeline
//! - [`diagnostics`] - Optional hook observing each rewrite
//! - [`interpose`] - Delegation to the real `bind`
//! - [`errno`] - Thread-local errno access
//!
//! The exported `bind` symbol itself lives in `bindpub-preload`.

pub mod address;
pub mod diagnostics;
pub mod errno;
pub mod error;
pub mod interpose;
pub mod raw;
pub mod resolver;
pub mod rewrite;

pub use address::{AddressFamily, BindRequest, PartialAddress, SocketAddress};
pub use diagnostics::{NoopHook, RewriteHook, TracingHook};
pub use error::{RewriteError, UnsupportedFamily};
pub use errno::{last_errno, set_errno};
pub use interpose::{BindInterposer, RealBind};
pub use raw::{RawAddressError, RawSocketAddress, SIN6_LEN_RFC2133};
pub use resolver::{HostnameResolver, PublicIpResolver, ResolveError};
pub use rewrite::{Rewrite, Rewriter};
