use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SCOUT_LOG";

/// Install the fmt subscriber once per process.
///
/// Filter comes from `SCOUT_LOG`, then `RUST_LOG`, then `info`. Repeated calls
/// (and calls after another subscriber was installed) are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
