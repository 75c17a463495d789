//! Logging for the bindpub shim.
//!
//! The shim lives inside someone else's process, so output goes to stderr and
//! an already installed global subscriber is never replaced.

pub mod logging;

pub use logging::{DEFAULT_FILTER, LOG_ENV, init_logging, init_logging_once};
