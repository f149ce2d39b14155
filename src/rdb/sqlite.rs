//! SQLite backend adapter over a single-connection sqlx pool.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Executor, Row, Statement as _, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use super::retry::retry_with_reconnect;
use super::translate::{self, SqlDialect, StatementClass};
use super::url::ParsedRdbUrl;
use super::{RdbBackend, StatementRequest};
use crate::backend::Backend;
use crate::error::GatewayError;

pub struct SqliteBackend {
    path: String,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteBackend {
    pub(crate) fn from_parsed(parsed: &ParsedRdbUrl) -> Result<Arc<dyn RdbBackend>, GatewayError> {
        let ParsedRdbUrl::Sqlite { path } = parsed else {
            return Err(GatewayError::Backend(
                "sqlite constructor received a non-sqlite URL".to_string(),
            ));
        };
        Ok(Arc::new(Self {
            path: path.clone(),
            pool: RwLock::new(None),
        }))
    }

    async fn open_pool(&self) -> Result<SqlitePool, GatewayError> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", self.path))?
            .busy_timeout(Duration::from_secs(5));
        if self.path != ":memory:" {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // A single connection keeps `:memory:` databases coherent and
        // serializes writers the way SQLite expects.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    async fn pool(&self) -> Result<SqlitePool, GatewayError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Backend("sqlite backend is not started".to_string()))
    }

    async fn reconnect(&self) -> Result<(), GatewayError> {
        let mut slot = self.pool.write().await;
        if let Some(old) = slot.take() {
            old.close().await;
        }
        *slot = Some(self.open_pool().await?);
        info!(path = %self.path, "sqlite backend reconnected");
        Ok(())
    }

    async fn run_query(&self, sql: &str, args: &[Value]) -> Result<Vec<u8>, GatewayError> {
        let pool = self.pool().await?;
        let prepared = pool.prepare(sql).await?;
        let columns: Vec<String> = prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = bind_args(prepared.query(), args).fetch_all(&pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(row_record(row, columns.len())?);
        }
        translate::encode_csv(&columns, &records)
    }

    async fn run_exec(&self, sql: &str, args: &[Value], bind: bool) -> Result<(), GatewayError> {
        let pool = self.pool().await?;
        let query = sqlx::query(sql);
        let query = if bind { bind_args(query, args) } else { query };
        query.execute(&pool).await?;
        Ok(())
    }

    async fn run_batch(
        &self,
        prepared: &[(translate::Translated, &[Value])],
    ) -> Result<(), GatewayError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for (translated, args) in prepared {
            let step = match translated.class {
                StatementClass::Dql => bind_args(sqlx::query(&translated.sql), *args)
                    .fetch_all(&mut *tx)
                    .await
                    .map(|_| ()),
                StatementClass::Dml => bind_args(sqlx::query(&translated.sql), *args)
                    .execute(&mut *tx)
                    .await
                    .map(|_| ()),
                _ => sqlx::query(&translated.sql).execute(&mut *tx).await.map(|_| ()),
            };
            if let Err(err) = step {
                tx.rollback().await.ok();
                return Err(err.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn start(&self) -> Result<(), GatewayError> {
        let pool = self.open_pool().await?;
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

#[async_trait]
impl RdbBackend for SqliteBackend {
    async fn query(&self, stmt: &str, args: &[Value]) -> Result<Vec<u8>, GatewayError> {
        let translated = translate::translate(SqlDialect::Sqlite, stmt, args.len())?;
        if translated.class != StatementClass::Dql {
            return Err(GatewayError::Sql(format!(
                "statement is not a query: {stmt}"
            )));
        }
        retry_with_reconnect(
            "sqlite query",
            || Box::pin(self.run_query(&translated.sql, args)),
            || Box::pin(self.reconnect()),
        )
        .await
    }

    async fn exec(&self, stmt: &str, args: &[Value]) -> Result<(), GatewayError> {
        let translated = translate::translate(SqlDialect::Sqlite, stmt, args.len())?;
        let bind = match translated.class {
            StatementClass::Dml => true,
            StatementClass::Ddl => false,
            _ => {
                return Err(GatewayError::Sql(format!(
                    "statement is not executable: {stmt}"
                )));
            }
        };
        retry_with_reconnect(
            "sqlite exec",
            || Box::pin(self.run_exec(&translated.sql, args, bind)),
            || Box::pin(self.reconnect()),
        )
        .await
    }

    async fn batch(&self, statements: &[StatementRequest]) -> Result<(), GatewayError> {
        let mut prepared = Vec::with_capacity(statements.len());
        for request in statements {
            let translated =
                translate::translate(SqlDialect::Sqlite, &request.stmt, request.args.len())?;
            if translated.class == StatementClass::Other {
                return Err(GatewayError::Sql(format!(
                    "unsupported statement in batch: {}",
                    request.stmt
                )));
            }
            prepared.push((translated, request.args.as_slice()));
        }
        retry_with_reconnect(
            "sqlite batch",
            || Box::pin(self.run_batch(&prepared)),
            || Box::pin(self.reconnect()),
        )
        .await
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_args<'q>(mut query: SqliteQuery<'q>, args: &'q [Value]) -> SqliteQuery<'q> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else {
                    query.bind(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn row_record(row: &SqliteRow, width: usize) -> Result<Vec<Option<String>>, GatewayError> {
    let mut record = Vec::with_capacity(width);
    for idx in 0..width {
        record.push(render_value(row, idx)?);
    }
    Ok(record)
}

/// Renders one column value for CSV. NULL becomes `None` (the empty
/// field); everything else uses the type's canonical display form.
fn render_value(row: &SqliteRow, idx: usize) -> Result<Option<String>, GatewayError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(None);
    }
    let type_name = raw.type_info().name().to_string();

    let rendered = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(idx)?.to_string(),
        "REAL" => row.try_get::<f64, _>(idx)?.to_string(),
        "TEXT" => row.try_get::<String, _>(idx)?,
        "BOOLEAN" => row.try_get::<bool, _>(idx)?.to_string(),
        "BLOB" => String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(idx)?).into_owned(),
        _ => {
            // NUMERIC / DATETIME columns carry whatever storage class the
            // value was written with; fall through the plausible decodings.
            if let Ok(s) = row.try_get::<String, _>(idx) {
                s
            } else if let Ok(i) = row.try_get::<i64, _>(idx) {
                i.to_string()
            } else if let Ok(f) = row.try_get::<f64, _>(idx) {
                f.to_string()
            } else {
                return Err(GatewayError::Sql(format!(
                    "unsupported column type: {type_name}"
                )));
            }
        }
    };
    Ok(Some(rendered))
}
