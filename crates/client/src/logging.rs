//! Tracing subscriber setup for binaries embedding the sync client.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber.
///
/// Honors `RUST_LOG` (default `info`). `LEDGERSYNC_LOG_JSON=1` switches to
/// JSON lines. Calling this twice is harmless.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("LEDGERSYNC_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
