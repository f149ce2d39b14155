//! Statement translation core: parse, classify, shim, validate, and encode
//! query results. Execution itself lives in the backend adapters; this
//! module is pure and fully synchronous.

use sqlparser::ast::{ObjectType, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::shim;
use crate::error::GatewayError;

/// Target dialect of a backend. The input dialect is always SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementClass {
    Dql,
    Dml,
    Ddl,
    Other,
}

/// A statement after shimming, carrying the rewritten SQL and its class.
#[derive(Debug, Clone)]
pub struct Translated {
    pub sql: String,
    pub class: StatementClass,
}

/// Parses exactly one top-level statement.
pub fn parse_single(stmt: &str) -> Result<Statement, GatewayError> {
    let mut parsed =
        Parser::parse_sql(&SQLiteDialect {}, stmt).map_err(|e| GatewayError::Sql(e.to_string()))?;
    match parsed.len() {
        0 => Err(GatewayError::Sql("empty statement".to_string())),
        1 => Ok(parsed.remove(0)),
        _ => Err(GatewayError::MultipleStatements),
    }
}

/// Classifies a statement by its top-level AST variant.
pub fn classify(stmt: &Statement) -> StatementClass {
    match stmt {
        Statement::Query(_) => StatementClass::Dql,
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            StatementClass::Dml
        }
        Statement::CreateTable(_)
        | Statement::AlterTable { .. }
        | Statement::CreateIndex(_) => StatementClass::Ddl,
        Statement::Drop { object_type, .. }
            if matches!(object_type, ObjectType::Table | ObjectType::Index) =>
        {
            StatementClass::Ddl
        }
        _ => StatementClass::Other,
    }
}

/// Parses, classifies, shims, and validates one statement against the
/// target dialect.
///
/// DDL is shimmed on the AST and re-rendered (its canonical printing).
/// DQL/DML keep the source text, with `?` placeholders rewritten for
/// PostgreSQL; the post-shim placeholder count must match the argument
/// count.
pub fn translate(
    dialect: SqlDialect,
    stmt: &str,
    args_len: usize,
) -> Result<Translated, GatewayError> {
    let ast = parse_single(stmt)?;
    let class = classify(&ast);

    match class {
        StatementClass::Ddl => {
            let ast = match dialect {
                SqlDialect::Postgres => shim::ddl_shim_postgres(ast),
                SqlDialect::Sqlite => ast,
            };
            Ok(Translated {
                sql: ast.to_string(),
                class,
            })
        }
        StatementClass::Dql | StatementClass::Dml => {
            let (sql, placeholders) = match dialect {
                SqlDialect::Postgres => shim::rewrite_placeholders_postgres(stmt),
                SqlDialect::Sqlite => (stmt.to_string(), shim::count_placeholders(stmt)),
            };
            if placeholders != args_len {
                return Err(GatewayError::ParameterCountMismatch {
                    placeholders,
                    args: args_len,
                });
            }
            Ok(Translated { sql, class })
        }
        StatementClass::Other => Ok(Translated {
            sql: stmt.to_string(),
            class,
        }),
    }
}

/// Encodes a result set as CSV: one header row of driver-reported column
/// names, then one record per row. NULL renders as the empty field.
pub(crate) fn encode_csv(
    columns: &[String],
    rows: &[Vec<Option<String>>],
) -> Result<Vec<u8>, GatewayError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(columns)
        .map_err(|e| GatewayError::Backend(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row.iter().map(|field| field.as_deref().unwrap_or("")))
            .map_err(|e| GatewayError::Backend(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| GatewayError::Backend(e.to_string()))
}
