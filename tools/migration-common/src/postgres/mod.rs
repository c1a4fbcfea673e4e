//! PostgreSQL target store
//!
//! One [`PostgresClient`] is created per run and passed by reference to every
//! phase. The storages in this module only build statements and hand them to
//! a [`BatchExecutor`], which keeps them usable against in-memory executors.

mod graph;
mod kv;
pub mod schema;
mod vector;

pub use graph::PgGraphStorage;
pub use kv::{PgDocStatusStorage, PgKvStorage};
pub use vector::{PgVectorStorage, VectorFields, VectorItem, VectorTable, vector_table_name};

use crate::JsonMap;
use crate::config::{PostgresConfig, RetryPolicy};
use crate::error::{MigrationError, MigrationResult};
use crate::storage::{BatchExecutor, ColumnKind, PageQuery, RowSource, SqlValue};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::future::Future;

/// Pooled connection plus the retry policy applied to every statement
pub struct PostgresClient {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresClient {
    /// Connect, retrying transient failures
    pub async fn connect(config: &PostgresConfig) -> MigrationResult<Self> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let retry = config.retry_policy();
        let mut attempt = 0;
        let pool = loop {
            let result = PgPoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options.clone())
                .await;
            match result {
                Ok(pool) => break pool,
                Err(e) if attempt + 1 < retry.attempts && is_transient(&e) => {
                    let delay = retry.delay_for(attempt);
                    tracing::warn!(attempt = attempt + 1, ?delay, error = %e, "Connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(MigrationError::Connection(e.to_string())),
            }
        };

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool, retry })
    }

    /// Run `op`, retrying transient errors with exponential backoff
    pub async fn run_with_retry<T, F, Fut>(&self, label: &str, mut op: F) -> MigrationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.retry.attempts && is_transient(&e) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt = attempt + 1,
                        ?delay,
                        error = %e,
                        "Database operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release the pool
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}

/// Errors worth another attempt
fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => true,
        // serialization_failure, deadlock_detected
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code == "40001" || code == "40P01"),
        _ => false,
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Vector(v) => query.bind(pgvector::Vector::from(v.clone())),
        SqlValue::TextArray(v) => query.bind(v.clone()),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v.clone())),
        SqlValue::Timestamp(v) => query.bind(*v),
    }
}

async fn execute_in_transaction(
    pool: &PgPool,
    sql: &str,
    rows: &[Vec<SqlValue>],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for params in rows {
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));
        query.execute(&mut *tx).await?;
    }
    tx.commit().await
}

fn decode_row(row: &PgRow, query: &PageQuery<'_>) -> Result<JsonMap, sqlx::Error> {
    let mut record = JsonMap::new();
    for column in query.columns {
        let value = match column.kind {
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(column.name)?
                .map_or(Value::Null, Value::String),
            ColumnKind::Int => row
                .try_get::<Option<i32>, _>(column.name)?
                .map_or(Value::Null, Value::from),
            ColumnKind::TextArray => row
                .try_get::<Option<Vec<String>>, _>(column.name)?
                .map_or(Value::Null, Value::from),
        };
        record.insert(column.name.to_string(), value);
    }
    Ok(record)
}

#[async_trait]
impl BatchExecutor for PostgresClient {
    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> MigrationResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let pool = &self.pool;
        self.run_with_retry("execute_batch", || execute_in_transaction(pool, sql, rows))
            .await
    }
}

#[async_trait]
impl RowSource for PostgresClient {
    async fn count_rows(&self, table: &str, workspace: &str) -> MigrationResult<u64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {table} WHERE workspace=$1");
        let pool = &self.pool;
        let sql = sql.as_str();
        let count: i64 = self
            .run_with_retry("count_rows", || async move {
                sqlx::query(sql)
                    .bind(workspace)
                    .fetch_one(pool)
                    .await?
                    .try_get("count")
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_page(&self, query: &PageQuery<'_>) -> MigrationResult<Vec<JsonMap>> {
        let column_list = query
            .columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ");
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let sql = match query.after {
            None => format!(
                "SELECT {column_list} FROM {} WHERE workspace=$1 ORDER BY id LIMIT $2",
                query.table
            ),
            Some(_) => format!(
                "SELECT {column_list} FROM {} WHERE workspace=$1 AND id > $2 ORDER BY id LIMIT $3",
                query.table
            ),
        };

        let pool = &self.pool;
        let sql = sql.as_str();
        let rows = self
            .run_with_retry("fetch_page", || async move {
                let mut q = sqlx::query(sql).bind(query.workspace);
                if let Some(after) = query.after {
                    q = q.bind(after);
                }
                q.bind(limit).fetch_all(pool).await
            })
            .await?;

        rows.iter()
            .map(|row| decode_row(row, query).map_err(MigrationError::from))
            .collect()
    }
}
