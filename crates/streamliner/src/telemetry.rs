//! Tracing setup for the fleet binary and embedding applications.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber with `RUST_LOG` or [`DEFAULT_FILTER`].
/// Returns false when a subscriber was already installed; the first one stays.
pub fn init_tracing() -> bool {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    init_tracing_with(&filter)
}

/// Device workers log from their own named threads, so thread names are on.
pub fn init_tracing_with(filter: &str) -> bool {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
