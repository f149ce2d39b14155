//! PostgreSQL backend adapter over a bounded sqlx pool.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row, Statement as _, TypeInfo, ValueRef};
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

const MAX_CONNECTIONS: u32 = 25;
const MIN_CONNECTIONS: u32 = 5;
const MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub struct PostgresBackend {
    host: String,
    port: u16,
    user: String,
    password: String,
    dbname: String,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresBackend {
    pub(crate) fn from_parsed(parsed: &ParsedRdbUrl) -> Result<Arc<dyn RdbBackend>, GatewayError> {
        let ParsedRdbUrl::Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = parsed
        else {
            return Err(GatewayError::Backend(
                "postgres constructor received a non-postgres URL".to_string(),
            ));
        };
        Ok(Arc::new(Self {
            host: host.clone(),
            port: *port,
            user: user.clone(),
            password: password.clone(),
            dbname: dbname.clone(),
            pool: RwLock::new(None),
        }))
    }

    async fn open_pool(&self) -> Result<PgPool, GatewayError> {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .max_lifetime(MAX_LIFETIME)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    async fn pool(&self) -> Result<PgPool, GatewayError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Backend("postgres backend is not started".to_string()))
    }

    async fn reconnect(&self) -> Result<(), GatewayError> {
        let mut slot = self.pool.write().await;
        if let Some(old) = slot.take() {
            old.close().await;
        }
        *slot = Some(self.open_pool().await?);
        info!(host = %self.host, dbname = %self.dbname, "postgres backend reconnected");
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
impl Backend for PostgresBackend {
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
        "postgres"
    }
}

#[async_trait]
impl RdbBackend for PostgresBackend {
    async fn query(&self, stmt: &str, args: &[Value]) -> Result<Vec<u8>, GatewayError> {
        let translated = translate::translate(SqlDialect::Postgres, stmt, args.len())?;
        if translated.class != StatementClass::Dql {
            return Err(GatewayError::Sql(format!(
                "statement is not a query: {stmt}"
            )));
        }
        retry_with_reconnect(
            "postgres query",
            || Box::pin(self.run_query(&translated.sql, args)),
            || Box::pin(self.reconnect()),
        )
        .await
    }

    async fn exec(&self, stmt: &str, args: &[Value]) -> Result<(), GatewayError> {
        let translated = translate::translate(SqlDialect::Postgres, stmt, args.len())?;
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
            "postgres exec",
            || Box::pin(self.run_exec(&translated.sql, args, bind)),
            || Box::pin(self.reconnect()),
        )
        .await
    }

    async fn batch(&self, statements: &[StatementRequest]) -> Result<(), GatewayError> {
        let mut prepared = Vec::with_capacity(statements.len());
        for request in statements {
            let translated =
                translate::translate(SqlDialect::Postgres, &request.stmt, request.args.len())?;
            if translated.class == StatementClass::Other {
                return Err(GatewayError::Sql(format!(
                    "unsupported statement in batch: {}",
                    request.stmt
                )));
            }
            prepared.push((translated, request.args.as_slice()));
        }
        retry_with_reconnect(
            "postgres batch",
            || Box::pin(self.run_batch(&prepared)),
            || Box::pin(self.reconnect()),
        )
        .await
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_args<'q>(mut query: PgQuery<'q>, args: &'q [Value]) -> PgQuery<'q> {
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

fn row_record(row: &PgRow, width: usize) -> Result<Vec<Option<String>>, GatewayError> {
    let mut record = Vec::with_capacity(width);
    for idx in 0..width {
        record.push(render_value(row, idx)?);
    }
    Ok(record)
}

/// Renders one column value for CSV. NULL becomes `None` (the empty
/// field); everything else uses the type's canonical display form.
fn render_value(row: &PgRow, idx: usize) -> Result<Option<String>, GatewayError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(None);
    }
    let type_name = raw.type_info().name().to_string();

    let rendered = match type_name.as_str() {
        "INT2" => row.try_get::<i16, _>(idx)?.to_string(),
        "INT4" => row.try_get::<i32, _>(idx)?.to_string(),
        "INT8" => row.try_get::<i64, _>(idx)?.to_string(),
        "FLOAT4" => row.try_get::<f32, _>(idx)?.to_string(),
        "FLOAT8" => row.try_get::<f64, _>(idx)?.to_string(),
        "NUMERIC" => row.try_get::<rust_decimal::Decimal, _>(idx)?.to_string(),
        "BOOL" => row.try_get::<bool, _>(idx)?.to_string(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => row.try_get::<String, _>(idx)?,
        "BYTEA" => String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(idx)?).into_owned(),
        "TIMESTAMP" => row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string(),
        "TIMESTAMPTZ" => row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?.to_string(),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(idx)?.to_string(),
        "TIME" => row.try_get::<chrono::NaiveTime, _>(idx)?.to_string(),
        _ => {
            if let Ok(s) = row.try_get::<String, _>(idx) {
                s
            } else {
                return Err(GatewayError::Sql(format!(
                    "unsupported column type: {type_name}"
                )));
            }
        }
    };
    Ok(Some(rendered))
}
