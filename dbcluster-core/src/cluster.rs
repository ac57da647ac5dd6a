//! The cluster handle: one writer, ordered readers, and the primitives that
//! route reads to a replica and everything else to the writer.
//!
//! A [`Cluster`] is built once by the application's composition root (via
//! [`ClusterInit`]) and passed by reference to every repository. None of the
//! primitives retry, and every driver error comes back exactly as reported.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::{Connector, Handle, PreparedHandle, TxHandle};
use crate::config::ClusterConfig;
use crate::diag::{CallSite, DebugFlag};
use crate::error::{ClusterError, Result};
use crate::row::{ExecResult, RowHandle, Rows};
use crate::selector::{select_reader, RandomSelector, ReplicaSelector};
use crate::value::{TrustedIdent, Value};

/// Open writer and reader handles.
pub struct Cluster {
    writer: Arc<dyn Handle>,
    readers: Vec<Arc<dyn Handle>>,
    selector: Arc<dyn ReplicaSelector>,
    debug: DebugFlag,
    closed: AtomicBool,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("readers", &self.readers.len())
            .field("debug", &self.debug.enabled())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Cluster {
    /// Open the writer, then every reader.
    ///
    /// A writer failure stops before any reader is dialed. A reader failure
    /// fails the whole call; handles opened so far are closed again.
    pub async fn open(
        config: &ClusterConfig,
        connector: &dyn Connector,
        selector: Arc<dyn ReplicaSelector>,
        debug: DebugFlag,
    ) -> Result<Self> {
        config.validate()?;

        let writer_target = config.writer_target();
        let writer = connector
            .open(&writer_target, &config.pool)
            .await
            .map_err(|e| ClusterError::connect(writer_target.role, writer_target.redacted(), e))?;

        let mut readers = Vec::with_capacity(config.read.len());
        for target in config.reader_targets() {
            match connector.open(&target, &config.pool).await {
                Ok(handle) => readers.push(handle),
                Err(e) => {
                    warn!(
                        role = %target.role,
                        endpoint = %target,
                        error = %e,
                        "reader open failed"
                    );
                    discard(writer, readers).await;
                    return Err(ClusterError::connect(target.role, target.redacted(), e));
                }
            }
        }

        info!(
            database = %config.database,
            readers = readers.len(),
            "cluster initialized"
        );

        Ok(Self {
            writer,
            readers,
            selector,
            debug,
            closed: AtomicBool::new(false),
        })
    }

    /// Build a cluster from handles that are already open.
    ///
    /// # Panics
    ///
    /// Panics if `readers` is empty.
    pub fn from_handles(
        writer: Arc<dyn Handle>,
        readers: Vec<Arc<dyn Handle>>,
        selector: Arc<dyn ReplicaSelector>,
        debug: DebugFlag,
    ) -> Self {
        assert!(!readers.is_empty(), "a cluster needs at least one reader");
        Self {
            writer,
            readers,
            selector,
            debug,
            closed: AtomicBool::new(false),
        }
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn debug_flag(&self) -> &DebugFlag {
        &self.debug
    }

    fn reader(&self) -> &dyn Handle {
        select_reader(self.selector.as_ref(), &self.readers).as_ref()
    }

    /// Read query on a randomly chosen replica.
    ///
    /// The whole result set is fetched before this returns, so the returned
    /// [`Rows`] holds every row in memory at once. Page large reads with
    /// `LIMIT`/`OFFSET` (see [`Pagination`](crate::Pagination)).
    pub async fn query(&self, sql: &str, args: &[Value]) -> sqlx::Result<Rows> {
        match self.reader().fetch_all(sql, args).await {
            Ok(rows) => Ok(Rows::new(rows)),
            Err(e) => {
                self.debug.failed(CallSite::Query, sql);
                Err(e)
            }
        }
    }

    /// Single-row read on a randomly chosen replica. Errors, including
    /// "no row", surface when the handle is scanned.
    pub async fn query_row(&self, sql: &str, args: &[Value]) -> RowHandle {
        RowHandle::new(self.reader().fetch_optional(sql, args).await)
    }

    /// Prepare a statement on the writer.
    pub async fn prepare(&self, sql: &str) -> sqlx::Result<Statement> {
        match self.writer.prepare(sql).await {
            Ok(inner) => Ok(Statement { inner }),
            Err(e) => {
                self.debug.failed(CallSite::Prepare, sql);
                Err(e)
            }
        }
    }

    /// Execute a write statement on the writer, outside any transaction.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        match self.writer.execute(sql, args).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.debug.failed_with_args(CallSite::Exec, sql, args);
                Err(e)
            }
        }
    }

    /// Start a transaction on the writer.
    pub async fn begin(&self) -> sqlx::Result<Transaction> {
        let inner = self.writer.begin().await?;
        Ok(Transaction {
            inner,
            debug: self.debug.clone(),
        })
    }

    /// Largest `key` in `table` among rows with `key % shard_count = shard_id`,
    /// read from a replica. An empty aggregate is `0`, not an error.
    pub async fn max(
        &self,
        table: TrustedIdent<'_>,
        key: TrustedIdent<'_>,
        shard_id: u64,
        shard_count: u64,
    ) -> sqlx::Result<u64> {
        let sql = max_sql(table, key);
        let value: Option<u64> = self
            .query_row(&sql, &[Value::UInt(shard_count), Value::UInt(shard_id)])
            .await
            .scan()?;
        Ok(value.unwrap_or(0))
    }

    /// Close the writer and every reader.
    ///
    /// Every handle gets a close attempt, all in flight at once; the failure
    /// of the last handle in writer-then-readers order is returned.
    /// Closing an already closed cluster is a no-op.
    pub async fn close(&self) -> sqlx::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("cluster already closed");
            return Ok(());
        }

        let handles = std::iter::once(&self.writer).chain(&self.readers);
        let results = join_all(handles.map(|handle| handle.close())).await;

        let mut last_err = None;
        for (position, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                match position {
                    0 => warn!(role = "writer", error = %e, "close failed"),
                    n => warn!(role = "reader", index = n - 1, error = %e, "close failed"),
                }
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => {
                info!("cluster closed");
                Ok(())
            }
        }
    }
}

fn max_sql(table: TrustedIdent<'_>, key: TrustedIdent<'_>) -> String {
    format!(
        "SELECT MAX({key}) FROM {table} WHERE {key} % ? = ?",
        key = key.quoted(),
        table = table.quoted()
    )
}

/// Best-effort cleanup after a partial open.
async fn discard(writer: Arc<dyn Handle>, readers: Vec<Arc<dyn Handle>>) {
    for handle in std::iter::once(writer).chain(readers) {
        if let Err(e) = handle.close().await {
            debug!(error = %e, "close after failed init");
        }
    }
}

/// A prepared statement. Runs on the writer, or inside the transaction
/// that prepared it.
pub struct Statement {
    inner: Box<dyn PreparedHandle>,
}

impl Statement {
    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    /// Execute with bound arguments. Failures are not logged here; the
    /// caller logged the SQL when it was prepared.
    pub async fn exec(&self, args: &[Value]) -> sqlx::Result<ExecResult> {
        self.inner.execute(args).await
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement").field("sql", &self.sql()).finish()
    }
}

/// A transaction on the writer. Single owner; finish it with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback).
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction {
    inner: Box<dyn TxHandle>,
    debug: DebugFlag,
}

impl Transaction {
    /// Prepare a statement scoped to this transaction.
    pub async fn prepare(&mut self, sql: &str) -> sqlx::Result<Statement> {
        match self.inner.prepare(sql).await {
            Ok(inner) => Ok(Statement { inner }),
            Err(e) => {
                self.debug.failed(CallSite::TxPrepare, sql);
                Err(e)
            }
        }
    }

    pub async fn exec(&mut self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        match self.inner.execute(sql, args).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.debug.failed_with_args(CallSite::TxExec, sql, args);
                Err(e)
            }
        }
    }

    pub async fn commit(self) -> sqlx::Result<()> {
        self.inner.commit().await
    }

    pub async fn rollback(self) -> sqlx::Result<()> {
        self.inner.rollback().await
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}

/// One-time initialization guard for a [`Cluster`].
///
/// The first `init` call opens the cluster; concurrent callers wait for it,
/// and every later call gets the same outcome back without touching the
/// connector again, failures included.
pub struct ClusterInit {
    cell: OnceCell<Result<Arc<Cluster>>>,
    selector: Arc<dyn ReplicaSelector>,
    debug: DebugFlag,
}

impl ClusterInit {
    pub fn new(debug: DebugFlag) -> Self {
        Self {
            cell: OnceCell::new(),
            selector: Arc::new(RandomSelector),
            debug,
        }
    }

    /// Replace the uniform random selector.
    pub fn with_selector(mut self, selector: impl ReplicaSelector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    pub async fn init(
        &self,
        config: &ClusterConfig,
        connector: &dyn Connector,
    ) -> Result<Arc<Cluster>> {
        self.cell
            .get_or_init(|| async {
                Cluster::open(config, connector, Arc::clone(&self.selector), self.debug.clone())
                    .await
                    .map(Arc::new)
            })
            .await
            .clone()
    }

    /// The cluster, once a successful `init` has completed.
    pub fn get(&self) -> Option<Arc<Cluster>> {
        match self.cell.get() {
            Some(Ok(cluster)) => Some(Arc::clone(cluster)),
            _ => None,
        }
    }
}
