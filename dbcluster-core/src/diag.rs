//! Debug-gated diagnostics for failing data-access calls.
//!
//! When the flag is on, a failing call logs its SQL text (and for `exec` /
//! `txExec` its arguments) under the [`DIAG_TARGET`] target. Logging never
//! touches the error handed back to the caller.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::value::{DisplayArgs, Value};

/// Tracing target for failing-call diagnostics.
pub const DIAG_TARGET: &str = "dbcluster::diag";

/// Environment variable read by [`DebugFlag::from_env`].
pub const DEBUG_ENV: &str = "APP_DEBUG";

/// Process-wide debug switch, cheap to clone and safe to flip at runtime.
#[derive(Debug, Clone, Default)]
pub struct DebugFlag(Arc<AtomicBool>);

impl DebugFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Read `APP_DEBUG`; `1`, `true`, `yes` and `on` enable it.
    ///
    /// A `.env` in the working directory is loaded first. Variables already
    /// set in the process environment win.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let enabled = std::env::var(DEBUG_ENV)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        Self::new(enabled)
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self, site: CallSite, sql: &str) {
        if self.enabled() {
            warn!(target: DIAG_TARGET, "{}: {}", site, sql);
        }
    }

    pub(crate) fn failed_with_args(&self, site: CallSite, sql: &str, args: &[Value]) {
        if self.enabled() {
            warn!(target: DIAG_TARGET, "{}: {}", site, sql);
            warn!(target: DIAG_TARGET, "args: {}", DisplayArgs(args));
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Which primitive produced a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallSite {
    Query,
    Prepare,
    TxPrepare,
    Exec,
    TxExec,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CallSite::Query => "query",
            CallSite::Prepare => "prepare",
            CallSite::TxPrepare => "txPrepare",
            CallSite::Exec => "exec",
            CallSite::TxExec => "txExec",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(v), "{:?} should enable debug", v);
        }
        for v in ["", "0", "false", "off", "nope"] {
            assert!(!parse_flag(v), "{:?} should not enable debug", v);
        }
    }

    #[test]
    fn clones_share_state() {
        let flag = DebugFlag::default();
        let other = flag.clone();

        assert!(!other.enabled());
        flag.set(true);
        assert!(other.enabled());
    }

    #[test]
    fn call_site_tags() {
        assert_eq!(CallSite::TxPrepare.to_string(), "txPrepare");
        assert_eq!(CallSite::TxExec.to_string(), "txExec");
        assert_eq!(CallSite::Query.to_string(), "query");
    }
}
