//! MySQL-protocol backend on sqlx pools.
//!
//! Each endpoint gets its own `MySqlPool`. With the default policy
//! (`max_idle = 0`) a connection is closed as soon as it is released, so no
//! idle connection outlives the call that used it.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlQueryResult,
    MySqlRow, MySqlStatement,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, Row as _, Statement as _, TypeInfo, ValueRef};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{Connector, Handle, PreparedHandle, TxHandle};
use crate::config::{ConnectTarget, PoolPolicy};
use crate::row::{ExecResult, Row};
use crate::value::Value;

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

type SharedTx = Arc<Mutex<Option<sqlx::Transaction<'static, MySql>>>>;

/// Build driver options for one endpoint.
///
/// Temporal columns always decode to chrono types, which covers the
/// `parseTime=true` part of the DSN.
pub fn connect_options(target: &ConnectTarget) -> sqlx::Result<MySqlConnectOptions> {
    if !target.driver.eq_ignore_ascii_case("mysql") {
        return Err(sqlx::Error::Configuration(
            format!("unsupported driver '{}'", target.driver).into(),
        ));
    }

    Ok(MySqlConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.username)
        .password(&target.password)
        .database(&target.database)
        .charset(&target.charset))
}

fn pool_options(policy: &PoolPolicy) -> MySqlPoolOptions {
    let options = MySqlPoolOptions::new()
        .max_connections(policy.max_connections.max(1))
        .min_connections(0)
        .acquire_timeout(policy.connect_timeout());

    if policy.max_idle == 0 {
        // Returning false from the release hook closes the connection
        options.after_release(|_conn, _meta| Box::pin(async { Ok(false) }))
    } else {
        options
    }
}

/// Opens one `MySqlPool` per endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn open(
        &self,
        target: &ConnectTarget,
        policy: &PoolPolicy,
    ) -> sqlx::Result<Arc<dyn Handle>> {
        let options = connect_options(target)?;
        let pool_options = pool_options(policy);

        let pool = if policy.lazy {
            pool_options.connect_lazy_with(options)
        } else {
            pool_options.connect_with(options).await?
        };

        debug!(role = %target.role, endpoint = %target, lazy = policy.lazy, "opened pool");
        Ok(Arc::new(MySqlHandle { pool }))
    }
}

/// Pooled handle to one MySQL endpoint.
#[derive(Debug, Clone)]
pub struct MySqlHandle {
    pool: MySqlPool,
}

impl MySqlHandle {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Handle for MySqlHandle {
    async fn fetch_all(&self, sql: &str, args: &[Value]) -> sqlx::Result<Vec<Row>> {
        let rows = bind_args(sqlx::query(sql), args).fetch_all(&self.pool).await?;
        decode_rows(&rows)
    }

    async fn fetch_optional(&self, sql: &str, args: &[Value]) -> sqlx::Result<Option<Row>> {
        let row = bind_args(sqlx::query(sql), args)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_row(&r, column_names(&r))).transpose()
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        let done = bind_args(sqlx::query(sql), args).execute(&self.pool).await?;
        Ok(exec_result(&done))
    }

    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>> {
        let prepared = (&self.pool).prepare(sql).await?;
        Ok(Box::new(MySqlPrepared {
            pool: self.pool.clone(),
            statement: sqlx::Statement::to_owned(&prepared),
        }))
    }

    async fn begin(&self) -> sqlx::Result<Box<dyn TxHandle>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx {
            tx: Arc::new(Mutex::new(Some(tx))),
        }))
    }

    async fn close(&self) -> sqlx::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

struct MySqlPrepared {
    pool: MySqlPool,
    statement: MySqlStatement<'static>,
}

#[async_trait]
impl PreparedHandle for MySqlPrepared {
    fn sql(&self) -> &str {
        self.statement.sql()
    }

    async fn execute(&self, args: &[Value]) -> sqlx::Result<ExecResult> {
        let done = bind_args(self.statement.query(), args)
            .execute(&self.pool)
            .await?;
        Ok(exec_result(&done))
    }
}

struct MySqlTx {
    tx: SharedTx,
}

fn finished() -> sqlx::Error {
    sqlx::Error::Protocol("transaction already committed or rolled back".into())
}

#[async_trait]
impl TxHandle for MySqlTx {
    async fn execute(&self, sql: &str, args: &[Value]) -> sqlx::Result<ExecResult> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let done = bind_args(sqlx::query(sql), args).execute(&mut **tx).await?;
        Ok(exec_result(&done))
    }

    async fn prepare(&self, sql: &str) -> sqlx::Result<Box<dyn PreparedHandle>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let prepared = (&mut **tx).prepare(sql).await?;
        Ok(Box::new(MySqlTxPrepared {
            tx: Arc::clone(&self.tx),
            statement: sqlx::Statement::to_owned(&prepared),
        }))
    }

    async fn commit(self: Box<Self>) -> sqlx::Result<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> sqlx::Result<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.rollback().await
    }
}

struct MySqlTxPrepared {
    tx: SharedTx,
    statement: MySqlStatement<'static>,
}

#[async_trait]
impl PreparedHandle for MySqlTxPrepared {
    fn sql(&self) -> &str {
        self.statement.sql()
    }

    async fn execute(&self, args: &[Value]) -> sqlx::Result<ExecResult> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let done = bind_args(self.statement.query(), args)
            .execute(&mut **tx)
            .await?;
        Ok(exec_result(&done))
    }
}

fn bind_args<'q>(mut query: MySqlQuery<'q>, args: &'q [Value]) -> MySqlQuery<'q> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Int(v) => query.bind(*v),
            Value::UInt(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

fn exec_result(done: &MySqlQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: done.rows_affected(),
        last_insert_id: done.last_insert_id(),
    }
}

fn column_names(row: &MySqlRow) -> Arc<[String]> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn decode_rows(rows: &[MySqlRow]) -> sqlx::Result<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| decode_row(row, Arc::clone(&columns)))
        .collect()
}

fn decode_row(row: &MySqlRow, columns: Arc<[String]>) -> sqlx::Result<Row> {
    let values = (0..row.len())
        .map(|index| decode_column(row, index))
        .collect::<sqlx::Result<Vec<_>>>()?;
    Ok(Row::with_shared_columns(columns, values))
}

/// Map a column onto [`Value`] by its reported MySQL type name.
fn decode_column(row: &MySqlRow, index: usize) -> sqlx::Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match row.columns()[index].type_info().name() {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::Int(row.try_get_unchecked::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => Value::UInt(row.try_get_unchecked::<u64, _>(index)?),
        "FLOAT" => Value::Float(f64::from(row.try_get_unchecked::<f32, _>(index)?)),
        "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => {
            Value::Timestamp(row.try_get_unchecked::<NaiveDateTime, _>(index)?)
        }
        "DATE" => Value::Timestamp(
            row.try_get_unchecked::<NaiveDate, _>(index)?
                .and_time(NaiveTime::MIN),
        ),
        // TIME spans -838:59:59..=838:59:59, wider than a time of day
        "TIME" => Value::Text(row.try_get_unchecked::<MySqlTime, _>(index)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        // VARCHAR, TEXT, DECIMAL, JSON, ENUM, SET
        _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;

    fn target(host: &str, port: u16) -> ConnectTarget {
        ConnectTarget {
            role: Role::Writer,
            driver: "mysql".to_string(),
            username: "root".to_string(),
            password: "x".to_string(),
            host: host.to_string(),
            port,
            database: "article".to_string(),
            charset: "utf8mb4".to_string(),
        }
    }

    #[test]
    fn rejects_unknown_driver() {
        let mut t = target("127.0.0.1", 3306);
        t.driver = "postgres".to_string();

        let err = connect_options(&t).unwrap_err();
        assert!(matches!(err, sqlx::Error::Configuration(_)));
        assert!(err.to_string().contains("postgres"));
    }

    #[tokio::test]
    async fn lazy_open_does_not_dial() {
        // Nothing listens on port 1; a lazy pool must still open
        let handle = MySqlConnector
            .open(&target("127.0.0.1", 1), &PoolPolicy::default())
            .await
            .expect("lazy open should not connect");

        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn eager_open_reports_unreachable_endpoint() {
        let policy = PoolPolicy {
            lazy: false,
            connect_timeout_secs: 1,
            ..PoolPolicy::default()
        };

        let result = MySqlConnector.open(&target("127.0.0.1", 1), &policy).await;
        assert!(result.is_err());
    }

    // Integration tests require a real database
    // Run with: MYSQL_HOST=127.0.0.1 MYSQL_PASSWORD=... cargo test -p dbcluster-core -- --ignored

    fn live_target() -> ConnectTarget {
        let env =
            |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
        ConnectTarget {
            role: Role::Writer,
            driver: "mysql".to_string(),
            username: env("MYSQL_USER", "root"),
            password: env("MYSQL_PASSWORD", ""),
            host: env("MYSQL_HOST", "127.0.0.1"),
            port: env("MYSQL_PORT", "3306").parse().expect("MYSQL_PORT must be a port"),
            database: env("MYSQL_DATABASE", "test"),
            charset: "utf8mb4".to_string(),
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn live_round_trip() {
        let handle = MySqlConnector
            .open(&live_target(), &PoolPolicy::default())
            .await
            .expect("open failed");

        handle
            .execute(
                "CREATE TABLE IF NOT EXISTS dbcluster_smoke \
                 (id BIGINT UNSIGNED PRIMARY KEY, title VARCHAR(64))",
                &[],
            )
            .await
            .expect("create failed");

        let tx = handle.begin().await.expect("begin failed");
        let stmt = tx
            .prepare("INSERT INTO dbcluster_smoke (id, title) VALUES (?, ?)")
            .await
            .expect("prepare failed");
        stmt.execute(&[Value::UInt(12), Value::Text("a".into())])
            .await
            .expect("insert failed");
        tx.rollback().await.expect("rollback failed");

        let row = handle
            .fetch_optional("SELECT 19 AS n, NULL AS missing, NOW() AS at", &[])
            .await
            .expect("select failed")
            .expect("one row");
        assert_eq!(row.get::<u64, _>("n").unwrap(), 19);
        assert!(row.values()[1].is_null());
        assert!(matches!(row.values()[2], Value::Timestamp(_)));

        // Durations outside a single day still decode
        let row = handle
            .fetch_optional(
                "SELECT CAST('-12:30:00' AS TIME) AS behind, CAST('100:00:00' AS TIME) AS ahead",
                &[],
            )
            .await
            .expect("time select failed")
            .expect("one row");
        assert_eq!(row.get::<String, _>("behind").unwrap(), "-12:30:00");
        assert_eq!(row.get::<String, _>("ahead").unwrap(), "100:00:00");

        handle
            .execute("DROP TABLE dbcluster_smoke", &[])
            .await
            .expect("drop failed");
        handle.close().await.unwrap();
    }
}
