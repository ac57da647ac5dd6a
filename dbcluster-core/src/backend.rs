//! Seams between the cluster and a concrete driver.
//!
//! A [`Connector`] turns a resolved [`ConnectTarget`] into a pooled
//! [`Handle`]. Handles must be safe for concurrent use by many callers; the
//! cluster holds no locks of its own around them.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ConnectTarget, PoolPolicy};
use crate::row::{ExecResult, Row};
use crate::value::Value;

/// Opens pooled handles for cluster endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        target: &ConnectTarget,
        policy: &PoolPolicy,
    ) -> sqlx::Result<Arc<dyn Handle>>;
}

/// A pooled connection to one endpoint.
#[async_trait]
pub trait Handle: Send + Sync {
    async fn fetch_all(&self, sql: &str, args: &[Value]) -> sqlx::Result<Vec<Row>>;

    async fn fetch_optional(&self, sql: &str, args: &[Value]) -> sqlx::Result<Option<Row>>;

    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult>;

    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>>;

    async fn begin(&self) -> sqlx::Result<Box<dyn TxHandle>>;

    async fn close(&self) -> sqlx::Result<()>;
}

/// An open transaction. Commit and rollback consume it.
#[async_trait]
pub trait TxHandle: Send + Sync {
    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult>;

    /// Statements prepared here run inside this transaction.
    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>>;

    async fn commit(self: Box<Self>) -> sqlx::Result<()>;

    async fn rollback(self: Box<Self>) -> sqlx::Result<()>;
}

/// A statement prepared on the writer or inside a transaction.
#[async_trait]
pub trait PreparedHandle: Send + Sync {
    fn sql(&self) -> &str;

    async fn execute(&self, args: &[Value]) -> sqlx::Result<ExecResult>;
}
