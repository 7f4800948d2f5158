//! Tracing setup for tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test-friendly subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
