//! Console tracing for binaries embedding the cluster.
//!
//! ```text
//! APP_DEBUG=1 app ...            # debug level + failing-call diagnostics
//! RUST_LOG=dbcluster=trace app   # fine-grained log control
//! ```

use tracing_subscriber::EnvFilter;

use crate::diag::DebugFlag;

/// Install a compact fmt subscriber. `RUST_LOG` wins when set; otherwise
/// the level is `debug` with the flag on and `info` without.
pub fn init_tracing(debug: &DebugFlag) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if debug.enabled() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug.enabled())
        .compact()
        .try_init()
}
