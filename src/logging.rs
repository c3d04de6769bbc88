use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. Development mode passes a `debug` filter so the verbose diagnostics
/// (query text, per-record details) become visible.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

/// Filter used when neither `RUST_LOG` nor development mode say otherwise.
pub fn default_filter(dev_mode: bool) -> &'static str {
    if dev_mode {
        "debug,reqwest=info,hyper=info"
    } else {
        "info"
    }
}
