use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. Filter comes from `FOCUSFLOW_LOG`,
/// e.g. `FOCUSFLOW_LOG=focusflow_core=debug`.
pub fn init() {
    let filter = EnvFilter::try_from_env("FOCUSFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
