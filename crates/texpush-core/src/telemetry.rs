//! Diagnostic logging for texpush.
//!
//! The build command's stdout is mirrored live to our own stdout, and the
//! run report follows it there. Diagnostics therefore always go to stderr,
//! so piping `texpush` output into a file or a CI log parser yields the
//! compiler's text and the report, never interleaved tracing lines.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber writing to stderr. `RUST_LOG` overrides
/// `level`; `json` switches to one JSON object per line. Later calls are
/// no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry.with(stderr_layer.json()).try_init()
    } else {
        registry.with(stderr_layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
