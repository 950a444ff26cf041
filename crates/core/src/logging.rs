//! Tracing subscriber setup shared by every frontend.
//!
//! Events go to stderr so report output on stdout stays machine-readable.

use std::sync::Once;

use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Build the filter: `RUST_LOG` wins, otherwise `default_directive` (e.g. `"warn"`).
fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the global tracing subscriber with human-readable output.
///
/// Subsequent calls (from either init function) are ignored.
pub fn init_tracing(default_directive: &str) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

        // A host that already installed a subscriber keeps it.
        let _ = tracing_subscriber::registry()
            .with(env_filter(default_directive))
            .with(fmt_layer)
            .try_init();

        debug!("malsim tracing initialized");
    });
}

/// Initialize tracing with JSON output for structured log collection.
pub fn init_tracing_json(default_directive: &str) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter(default_directive))
            .with(fmt_layer)
            .try_init();

        debug!("malsim tracing initialized (JSON mode)");
    });
}

/// Map a `-v` count to a default directive: 0 → warn, 1 → info, 2+ → debug.
pub fn verbosity_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}
