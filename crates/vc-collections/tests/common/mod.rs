//! Helpers shared by the integration tests.

use tracing_subscriber::EnvFilter;

/// Route library `tracing` events to the test output. `RUST_LOG=debug`
/// shows index relocations and backoff yields.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
