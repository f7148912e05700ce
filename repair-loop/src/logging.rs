//! Development tracing for the repair loop.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`. Product output (the
//! loop result, batch summaries) goes to stdout and the audit directory, and
//! is unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_filter` when unset.
///
/// # Example
/// ```bash
/// RUST_LOG=repair_loop=debug repair-loop run src/Order.php --dry-run
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
