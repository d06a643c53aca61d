//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "GUPLOAD_LOG";

/// Filter used when neither `GUPLOAD_LOG` nor `RUST_LOG` is set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "gupload=debug"
    } else {
        "gupload=warn"
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}
