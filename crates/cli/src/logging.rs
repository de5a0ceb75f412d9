//! Process-wide `tracing` subscriber for the CLI.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install a stderr fmt subscriber. `RUST_LOG` takes precedence; otherwise each
/// `-v` raises the level from `warn`. Later calls are ignored.
pub fn init_logging(verbosity: u8) {
    INIT.call_once(|| {
        let default_level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

        // Another subscriber may already be installed (e.g. by an embedding test harness).
        let _ = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
    });
}
