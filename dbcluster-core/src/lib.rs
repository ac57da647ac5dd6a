//! dbcluster-core: write/read replica splitting for a MySQL-protocol cluster
//!
//! One writer takes mutations, prepared statements and transactions; reads
//! go to a replica picked uniformly at random per call. Failing calls are
//! logged only when the debug flag is on, and driver errors always reach
//! the caller unchanged.
//!
//! ```ignore
//! let debug = DebugFlag::from_env();
//! let config = ClusterConfig::load("cluster.toml")?;
//! let init = ClusterInit::new(debug);
//! let cluster = init.init(&config, &MySqlConnector).await?;
//!
//! let rows = cluster.query("SELECT id, title FROM articles WHERE id > ?", &args![10]).await?;
//! let last_in_shard = cluster
//!     .max(TrustedIdent::new("articles"), TrustedIdent::new("id"), 3, 16)
//!     .await?;
//! cluster.close().await?;
//! ```

pub mod backend;
pub mod cluster;
pub mod config;
pub mod diag;
pub mod error;
pub mod mysql;
pub mod pagination;
pub mod row;
pub mod scripted;
pub mod selector;
pub mod tracing_setup;
pub mod value;

pub use backend::{Connector, Handle, PreparedHandle, TxHandle};
pub use cluster::{Cluster, ClusterInit, Statement, Transaction};
pub use config::{ClusterConfig, ConnectTarget, Endpoint, PoolPolicy, Role};
pub use diag::{DebugFlag, DIAG_TARGET};
pub use error::{ClusterError, Result};
pub use mysql::MySqlConnector;
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use row::{ExecResult, Row, RowHandle, Rows};
pub use selector::{RandomSelector, ReplicaSelector};
pub use value::{FromValue, TrustedIdent, Value};
