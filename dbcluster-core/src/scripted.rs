//! In-process backend with scripted responses, for tests.
//!
//! A [`ScriptedConnector`] hands out one [`ScriptedHandle`] per host and
//! keeps them reachable by host name, so a test can script results and
//! failures after the cluster is up and inspect every call afterwards.
//! No SQL is parsed: reads answer from responders registered per exact SQL
//! text, writes report one affected row.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{Connector, Handle, PreparedHandle, TxHandle};
use crate::config::{ConnectTarget, PoolPolicy};
use crate::row::{ExecResult, Row};
use crate::value::Value;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which primitive a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Execute,
    Prepare,
    StmtExec,
    Begin,
    TxExec,
    TxPrepare,
    Commit,
    Rollback,
}

/// One call observed by a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Operation,
    pub sql: String,
    pub args: Vec<Value>,
    /// Transaction id for calls made inside a transaction
    pub tx: Option<u64>,
}

/// Statements a transaction ran, in order, and how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    pub id: u64,
    pub statements: Vec<String>,
    pub committed: bool,
}

type Responder = Arc<dyn Fn(&[Value]) -> Vec<Row> + Send + Sync>;

#[derive(Default)]
struct HandleState {
    host: String,
    calls: Mutex<Vec<Call>>,
    responders: Mutex<HashMap<String, Responder>>,
    failures: Mutex<HashMap<(Operation, String), String>>,
    finished: Mutex<Vec<TxRecord>>,
    close_error: Mutex<Option<String>>,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    next_tx: AtomicU64,
    next_insert_id: AtomicU64,
}

impl HandleState {
    fn record(
        &self,
        op: Operation,
        sql: &str,
        args: &[Value],
        tx: Option<u64>,
    ) -> sqlx::Result<()> {
        lock(&self.calls).push(Call {
            op,
            sql: sql.to_string(),
            args: args.to_vec(),
            tx,
        });

        if self.closed.load(Ordering::Acquire) {
            return Err(sqlx::Error::PoolClosed);
        }
        match lock(&self.failures).get(&(op, sql.to_string())) {
            Some(message) => Err(sqlx::Error::Protocol(message.clone())),
            None => Ok(()),
        }
    }

    fn write_result(&self) -> ExecResult {
        ExecResult {
            rows_affected: 1,
            last_insert_id: self.next_insert_id.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    fn rows_for(&self, sql: &str, args: &[Value]) -> Vec<Row> {
        let responder = lock(&self.responders).get(sql).cloned();
        responder.map(|f| f(args)).unwrap_or_default()
    }
}

/// Scripted handle for one endpoint. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedHandle {
    state: Arc<HandleState>,
}

impl std::fmt::Debug for ScriptedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHandle")
            .field("host", &self.state.host)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ScriptedHandle {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            state: Arc::new(HandleState {
                host: host.into(),
                ..HandleState::default()
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.state.host
    }

    /// Answer reads of exactly `sql` with fixed rows.
    pub fn respond(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.respond_with(sql, move |_| rows.clone());
    }

    /// Answer reads of exactly `sql` by computing rows from the bound arguments.
    pub fn respond_with<F>(&self, sql: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Vec<Row> + Send + Sync + 'static,
    {
        lock(&self.state.responders).insert(sql.into(), Arc::new(f));
    }

    /// Make `op` on exactly `sql` fail with `sqlx::Error::Protocol(message)`.
    /// `Begin`, `Commit` and `Rollback` use an empty SQL string.
    pub fn fail(&self, op: Operation, sql: impl Into<String>, message: impl Into<String>) {
        lock(&self.state.failures).insert((op, sql.into()), message.into());
    }

    pub fn fail_close(&self, message: impl Into<String>) {
        *lock(&self.state.close_error) = Some(message.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state.calls).clone()
    }

    /// Number of recorded calls of one kind.
    pub fn count(&self, op: Operation) -> usize {
        lock(&self.state.calls).iter().filter(|c| c.op == op).count()
    }

    /// Transactions that reached commit or rollback, in completion order.
    pub fn transactions(&self) -> Vec<TxRecord> {
        lock(&self.state.finished).clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Handle for ScriptedHandle {
    async fn fetch_all(&self, sql: &str, args: &[Value]) -> sqlx::Result<Vec<Row>> {
        self.state.record(Operation::Fetch, sql, args, None)?;
        Ok(self.state.rows_for(sql, args))
    }

    async fn fetch_optional(&self, sql: &str, args: &[Value]) -> sqlx::Result<Option<Row>> {
        self.state.record(Operation::Fetch, sql, args, None)?;
        Ok(self.state.rows_for(sql, args).into_iter().next())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        self.state.record(Operation::Execute, sql, args, None)?;
        Ok(self.state.write_result())
    }

    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>> {
        self.state.record(Operation::Prepare, sql, &[], None)?;
        Ok(Box::new(ScriptedStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
            tx: None,
        }))
    }

    async fn begin(&self) -> sqlx::Result<Box<dyn TxHandle>> {
        let id = self.state.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.record(Operation::Begin, "", &[], Some(id))?;
        Ok(Box::new(ScriptedTx {
            state: Arc::clone(&self.state),
            log: Arc::new(TxLog {
                id,
                statements: Mutex::new(Vec::new()),
                done: AtomicBool::new(false),
            }),
        }))
    }

    async fn close(&self) -> sqlx::Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::AcqRel);
        self.state.closed.store(true, Ordering::Release);
        match lock(&self.state.close_error).clone() {
            Some(message) => Err(sqlx::Error::Protocol(message)),
            None => Ok(()),
        }
    }
}

struct TxLog {
    id: u64,
    statements: Mutex<Vec<String>>,
    done: AtomicBool,
}

impl TxLog {
    fn ensure_open(&self) -> sqlx::Result<()> {
        if self.done.load(Ordering::Acquire) {
            Err(sqlx::Error::Protocol(
                "transaction already committed or rolled back".into(),
            ))
        } else {
            Ok(())
        }
    }
}

struct ScriptedTx {
    state: Arc<HandleState>,
    log: Arc<TxLog>,
}

impl ScriptedTx {
    fn finish(&self, op: Operation, committed: bool) -> sqlx::Result<()> {
        self.log.ensure_open()?;
        self.state.record(op, "", &[], Some(self.log.id))?;
        self.log.done.store(true, Ordering::Release);
        lock(&self.state.finished).push(TxRecord {
            id: self.log.id,
            statements: lock(&self.log.statements).clone(),
            committed,
        });
        Ok(())
    }
}

#[async_trait]
impl TxHandle for ScriptedTx {
    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        self.log.ensure_open()?;
        self.state.record(Operation::TxExec, sql, args, Some(self.log.id))?;
        lock(&self.log.statements).push(sql.to_string());
        Ok(self.state.write_result())
    }

    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>> {
        self.log.ensure_open()?;
        self.state.record(Operation::TxPrepare, sql, &[], Some(self.log.id))?;
        Ok(Box::new(ScriptedStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
            tx: Some(Arc::clone(&self.log)),
        }))
    }

    async fn commit(self: Box<Self>) -> sqlx::Result<()> {
        self.finish(Operation::Commit, true)
    }

    async fn rollback(self: Box<Self>) -> sqlx::Result<()> {
        self.finish(Operation::Rollback, false)
    }
}

struct ScriptedStatement {
    state: Arc<HandleState>,
    sql: String,
    tx: Option<Arc<TxLog>>,
}

#[async_trait]
impl PreparedHandle for ScriptedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, args: &[Value]) -> sqlx::Result<ExecResult> {
        if let Some(log) = &self.tx {
            log.ensure_open()?;
        }
        let tx_id = self.tx.as_ref().map(|log| log.id);
        self.state.record(Operation::StmtExec, &self.sql, args, tx_id)?;
        if let Some(log) = &self.tx {
            lock(&log.statements).push(self.sql.clone());
        }
        Ok(self.state.write_result())
    }
}

/// Hands out scripted handles keyed by host.
#[derive(Default)]
pub struct ScriptedConnector {
    handles: Mutex<HashMap<String, ScriptedHandle>>,
    opens: Mutex<HashMap<String, usize>>,
    open_failures: Mutex<HashMap<String, String>>,
    targets: Mutex<Vec<ConnectTarget>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create the handle for `host`, so it can be scripted before init.
    pub fn handle(&self, host: &str) -> ScriptedHandle {
        lock(&self.handles)
            .entry(host.to_string())
            .or_insert_with(|| ScriptedHandle::new(host))
            .clone()
    }

    /// Refuse connections to `host`.
    pub fn fail_open(&self, host: impl Into<String>, message: impl Into<String>) {
        lock(&self.open_failures).insert(host.into(), message.into());
    }

    /// How many times `host` was opened.
    pub fn opens(&self, host: &str) -> usize {
        lock(&self.opens).get(host).copied().unwrap_or(0)
    }

    /// Every target passed to `open`, in call order.
    pub fn targets(&self) -> Vec<ConnectTarget> {
        lock(&self.targets).clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        target: &ConnectTarget,
        _policy: &PoolPolicy,
    ) -> sqlx::Result<Arc<dyn Handle>> {
        // Let concurrent initializers interleave
        tokio::task::yield_now().await;

        *lock(&self.opens).entry(target.host.clone()).or_insert(0) += 1;
        lock(&self.targets).push(target.clone());

        if let Some(message) = lock(&self.open_failures).get(&target.host) {
            return Err(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                message.clone(),
            )));
        }

        Ok(Arc::new(self.handle(&target.host)))
    }
}
