//! Logging bootstrap.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "RELSYNC_LOG";

/// Installs a compact global subscriber.
///
/// The filter comes from `RELSYNC_LOG` when set, otherwise `debug` or
/// `info` depending on `verbose`. Returns `false` if a global subscriber
/// was already installed.
pub fn init_logging(verbose: bool) -> bool {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
