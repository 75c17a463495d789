//! Logging initialization for the shim.

use std::io::{self, IsTerminal};

use eyre::{Result, eyre};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV: &str = "BINDPUB_LOG";

/// Used when [`LOG_ENV`] is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn";

/// Parse `directives`, falling back to [`DEFAULT_FILTER`].
fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr `fmt` subscriber filtered by [`LOG_ENV`].
///
/// Fails when the process already has a global subscriber.
pub fn init_logging() -> Result<()> {
    let directives = std::env::var(LOG_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(filter_from(directives.as_deref()))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .without_time()
        .try_init()
        .map_err(|e| eyre!("failed to install log subscriber: {e}"))
}

/// [`init_logging`] at most once per process.
///
/// A subscriber installed by the host process is kept.
pub fn init_logging_once() {
    static INIT: OnceCell<()> = OnceCell::new();

    INIT.get_or_init(|| {
        if let Err(err) = init_logging() {
            tracing::debug!(%err, "keeping existing subscriber");
        }
    });
}
