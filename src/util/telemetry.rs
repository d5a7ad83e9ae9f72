//! Telemetry helpers for structured logging.

/// Install a default `tracing` subscriber driven by `RUST_LOG`.
///
/// Applications that configure their own subscriber can skip this; the call is
/// a no-op when a global dispatcher is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
