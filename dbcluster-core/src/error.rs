//! Structured error types for cluster lifecycle and configuration.
//!
//! Data-access primitives (query, exec, prepare, transactions) return
//! `sqlx::Error` untouched so callers see exactly what the driver reported.
//! Everything that can go wrong before a cluster exists lands here instead.
//!
//! The type is `Clone`: every caller racing on initialization must observe
//! the same failure, so non-cloneable sources are shared through `Arc`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Role;

/// Main error type for dbcluster-core operations
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    /// Opening a pooled handle to an endpoint failed
    #[error("Failed to open {role} connection to {target}: {source}")]
    Connect {
        role: Role,
        /// Redacted connection target (no password)
        target: String,
        #[source]
        source: Arc<sqlx::Error>,
    },

    /// The cluster descriptor is unusable
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Reads need at least one replica
    #[error("No read replicas configured")]
    NoReaders,

    /// Config file could not be read
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Config file is not valid TOML for a cluster descriptor
    #[error("Invalid cluster config: {source}")]
    Toml {
        #[source]
        source: Arc<toml::de::Error>,
    },
}

/// Result type alias for dbcluster-core lifecycle operations
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    /// Create a connect error for one endpoint
    pub fn connect(role: Role, target: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connect {
            role,
            target: target.into(),
            source: Arc::new(source),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an I/O error tied to a config path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// The driver error behind a connect failure, if any
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Connect { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ClusterError {
    fn from(source: toml::de::Error) -> Self {
        Self::Toml {
            source: Arc::new(source),
        }
    }
}
