//! Cluster descriptor: one writer endpoint, an ordered list of readers,
//! shared defaults for credentials, and the pool policy applied to every handle.
//!
//! Loaded from TOML:
//!
//! ```toml
//! driver = "mysql"
//! database = "article"
//! charset = "utf8mb4"
//! username = "root"
//! password = "secret"
//!
//! [write]
//! host = "10.0.0.1"
//! port = 3306
//!
//! [[read]]
//! host = "10.0.0.2"
//! port = 3306
//! username = "ro"
//! password = "ro-secret"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ClusterError, Result};

fn default_driver() -> String {
    "mysql".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_lazy() -> bool {
    true
}

/// Immutable description of the cluster, supplied once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Default credentials, used by any endpoint lacking its own pair
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub write: Endpoint,
    #[serde(default)]
    pub read: Vec<Endpoint>,
    #[serde(default)]
    pub pool: PoolPolicy,
}

/// One host in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
        }
    }

    /// Override the cluster default credentials for this endpoint.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Own credentials only count when both halves are set.
    fn has_own_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Pool behaviour applied to every handle.
///
/// `max_idle = 0` keeps no idle connections between calls: each call pays
/// connection setup but never picks up a stale one. Raise it to trade that
/// back for reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPolicy {
    #[serde(default)]
    pub max_idle: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Validate options at open time without dialing the endpoint
    #[serde(default = "default_lazy")]
    pub lazy: bool,
}

impl PoolPolicy {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            max_idle: 0,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            lazy: default_lazy(),
        }
    }
}

/// Which side of the cluster a handle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Writer,
    /// Index into the configured reader list
    Reader(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Reader(index) => write!(f, "reader #{}", index),
        }
    }
}

/// Fully resolved connection parameters for one endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub role: Role,
    pub driver: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub charset: String,
}

impl ConnectTarget {
    /// `user:pass@tcp(host:port)/database?charset=..&parseTime=true`
    pub fn dsn(&self) -> String {
        self.format_dsn(&self.password)
    }

    /// Same as [`dsn`](Self::dsn) with the password masked, for logs and errors.
    pub fn redacted(&self) -> String {
        self.format_dsn("***")
    }

    fn format_dsn(&self, password: &str) -> String {
        format!(
            "{}:{}@tcp({}:{})/{}?charset={}&parseTime=true",
            self.username, password, self.host, self.port, self.database, self.charset
        )
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("role", &self.role)
            .field("driver", &self.driver)
            .field("dsn", &self.redacted())
            .finish()
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.driver, self.redacted())
    }
}

impl ClusterConfig {
    /// Load and validate a cluster descriptor from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ClusterError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a cluster descriptor.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the lifecycle manager relies on.
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(ClusterError::config("driver is empty"));
        }
        if self.database.is_empty() {
            return Err(ClusterError::config("database name is empty"));
        }
        if self.write.host.is_empty() {
            return Err(ClusterError::config("write endpoint has no host"));
        }
        if self.read.is_empty() {
            return Err(ClusterError::NoReaders);
        }
        if let Some(index) = self.read.iter().position(|r| r.host.is_empty()) {
            return Err(ClusterError::config(format!("read endpoint #{} has no host", index)));
        }
        Ok(())
    }

    /// Effective `(username, password)` for an endpoint.
    pub fn resolve_credentials<'a>(&'a self, endpoint: &'a Endpoint) -> (&'a str, &'a str) {
        if endpoint.has_own_credentials() {
            (&endpoint.username, &endpoint.password)
        } else {
            (&self.username, &self.password)
        }
    }

    pub fn target(&self, role: Role, endpoint: &Endpoint) -> ConnectTarget {
        let (username, password) = self.resolve_credentials(endpoint);
        ConnectTarget {
            role,
            driver: self.driver.clone(),
            username: username.to_string(),
            password: password.to_string(),
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: self.database.clone(),
            charset: self.charset.clone(),
        }
    }

    pub fn writer_target(&self) -> ConnectTarget {
        self.target(Role::Writer, &self.write)
    }

    /// Reader targets in configured order.
    pub fn reader_targets(&self) -> Vec<ConnectTarget> {
        self.read
            .iter()
            .enumerate()
            .map(|(index, endpoint)| self.target(Role::Reader(index), endpoint))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
database = "article"
username = "root"
password = "x"

[write]
host = "10.0.0.1"

[[read]]
host = "10.0.0.2"
port = 3307

[[read]]
host = "10.0.0.3"
username = "ro"
password = "y"
"#;

    #[test]
    fn parses_with_defaults() {
        let config = ClusterConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.driver, "mysql");
        assert_eq!(config.charset, "utf8mb4");
        assert_eq!(config.write.port, 3306);
        assert_eq!(config.read.len(), 2);
        assert_eq!(config.read[0].port, 3307);
        assert_eq!(config.pool, PoolPolicy::default());
        assert_eq!(config.pool.max_idle, 0);
    }

    #[test]
    fn reader_credentials_fall_back_to_defaults() {
        let config = ClusterConfig::from_toml_str(SAMPLE).unwrap();
        let targets = config.reader_targets();

        assert_eq!(targets[0].username, "root");
        assert_eq!(targets[0].password, "x");
        assert_eq!(targets[1].username, "ro");
        assert_eq!(targets[1].password, "y");
        assert_eq!(targets[1].role, Role::Reader(1));
    }

    #[test]
    fn half_set_override_is_ignored() {
        let config = ClusterConfig::from_toml_str(SAMPLE).unwrap();
        let endpoint = Endpoint::new("h", 3306).with_credentials("ro", "");

        assert_eq!(config.resolve_credentials(&endpoint), ("root", "x"));
    }

    #[test]
    fn dsn_format() {
        let config = ClusterConfig::from_toml_str(SAMPLE).unwrap();
        let target = config.writer_target();

        assert_eq!(
            target.dsn(),
            "root:x@tcp(10.0.0.1:3306)/article?charset=utf8mb4&parseTime=true"
        );
        assert!(!target.redacted().contains(":x@"));
        assert!(!format!("{:?}", target).contains(":x@"));
        assert!(target.to_string().starts_with("mysql "));
    }

    #[test]
    fn rejects_missing_readers() {
        let content = r#"
database = "article"

[write]
host = "10.0.0.1"
"#;
        let err = ClusterConfig::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ClusterError::NoReaders));
    }

    #[test]
    fn rejects_empty_database() {
        let content = r#"
database = ""

[write]
host = "10.0.0.1"

[[read]]
host = "10.0.0.2"
"#;
        let err = ClusterConfig::from_toml_str(content).unwrap_err();
        assert!(matches!(err, ClusterError::Config { .. }));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ClusterConfig::from_toml_str("database = ").unwrap_err();
        assert!(matches!(err, ClusterError::Toml { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();
        file.flush().unwrap();

        let config = ClusterConfig::load(file.path()).unwrap();
        assert_eq!(config.database, "article");

        let err = ClusterConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ClusterError::Io { .. }));
    }

    #[test]
    fn pool_policy_overrides() {
        let content = format!("{}\n[pool]\nmax_idle = 2\nlazy = false\n", SAMPLE);
        let config = ClusterConfig::from_toml_str(&content).unwrap();

        assert_eq!(config.pool.max_idle, 2);
        assert!(!config.pool.lazy);
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.pool.connect_timeout(), Duration::from_secs(30));
    }
}
