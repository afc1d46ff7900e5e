//! Log setup for the command line tool
//!
//! `LCUS_RELAY_LOG` or `RUST_LOG` sets the filter (e.g. `lcus_relay_core=debug`).
//! Logs go to stderr so `--json` output on stdout stays clean.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `verbose` raises the default level to debug.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("LCUS_RELAY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(verbose),
    );
    let _ = tracing::subscriber::set_global_default(subscriber);
}
