//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `AGENT_CHAT_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs a stderr `fmt` subscriber. A second call is a no-op.
pub fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
