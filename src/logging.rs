//! Diagnostic logging.
//!
//! Diagnostics go through `tracing` to **stderr**, filtered by `RUST_LOG`
//! (default `warn`). Command results are printed to stdout, so stdout
//! stays parseable for scripts.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "md_assist=debug,mda=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
