use tracing_subscriber::EnvFilter;

const ENV_LOG: &str = "STACKSIGNAL_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the stderr subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = filter_from(|key| std::env::var(key).ok());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter_from(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    let directive = [ENV_LOG, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());

    EnvFilter::try_new(&directive).unwrap_or_else(|error| {
        eprintln!("ignoring invalid log filter {directive:?}: {error}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}
