//! Structured logging to stderr
//!
//! Filter comes from `RUST_LOG`; without it fixtures log at `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset or invalid
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init();
        init();
        tracing::info!("still logging");
    }
}
