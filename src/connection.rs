//! Connection Module
//!
//! Provides connection establishment for the bundled SQLite driver and the
//! [`SqliteExecutor`] that implements [`Executor`] over it.
//!
//! Foreign keys are switched on for every connection so the store enforces the
//! constraints emitted by the schema compiler.

use crate::executor::{Dialect, ExecError, ExecResult, Executor, Row};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use sea_query::Value;
use std::path::Path;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Connection error type
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Invalid connection string format
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    /// Error from the SQLite driver while opening
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Where a connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(String),
}

/// Validates a connection string and resolves its target
///
/// Supported formats:
/// - `sqlite::memory:` or `:memory:`
/// - `sqlite://path/to/db.sqlite` (also `sqlite:path`)
/// - a bare file path
pub fn parse_connection_string(connection_string: &str) -> Result<ConnectionTarget, ConnectionError> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(ConnectionError::InvalidConnectionString(
            "Connection string cannot be empty".to_string(),
        ));
    }

    if trimmed == ":memory:" || trimmed == "sqlite::memory:" || trimmed == "sqlite://:memory:" {
        return Ok(ConnectionTarget::Memory);
    }

    if trimmed.starts_with("postgres://")
        || trimmed.starts_with("postgresql://")
        || trimmed.starts_with("mysql://")
    {
        return Err(ConnectionError::InvalidConnectionString(format!(
            "'{}' is not a SQLite location; supply an Executor for that backend",
            trimmed
        )));
    }

    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);

    if path.is_empty() {
        return Err(ConnectionError::InvalidConnectionString(
            "SQLite connection string has no path".to_string(),
        ));
    }

    Ok(ConnectionTarget::File(path.to_string()))
}

/// Opens a SQLite connection from a connection string
pub fn connect(connection_string: &str) -> Result<SqliteExecutor, ConnectionError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::acquire_connection_span(connection_string).entered();

    let conn = match parse_connection_string(connection_string)? {
        ConnectionTarget::Memory => Connection::open_in_memory()?,
        ConnectionTarget::File(path) => Connection::open(Path::new(&path))?,
    };
    log::debug!("opened SQLite connection to {}", connection_string);
    SqliteExecutor::new(conn).map_err(|e| match e {
        ExecError::Sqlite(inner) => ConnectionError::Sqlite(inner),
        other => ConnectionError::InvalidConnectionString(other.to_string()),
    })
}

/// [`Executor`] over a single `rusqlite` connection
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Wrap an open connection, enabling foreign key enforcement
    pub fn new(conn: Connection) -> Result<Self, ExecError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, ExecError> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecError> {
        Self::new(Connection::open(path)?)
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Executor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, ExecError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("execute: {} {:?}", sql, params);
        let bound = to_sql_values(params)?;
        let rows_affected = self.conn.execute(sql, params_from_iter(bound))?;
        Ok(ExecResult {
            rows_affected: rows_affected as u64,
            last_insert_id: Some(self.conn.last_insert_rowid()),
        })
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("query: {} {:?}", sql, params);
        let bound = to_sql_values(params)?;
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(bound))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (idx, name) in names.iter().enumerate() {
                map.insert(name.clone(), decode_column(row.get_ref(idx)?)?);
            }
            out.push(map);
        }
        Ok(out)
    }

    fn begin_transaction(&self) -> Result<(), ExecError> {
        log::debug!("BEGIN");
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), ExecError> {
        log::debug!("COMMIT");
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn roll_back(&self) -> Result<(), ExecError> {
        log::debug!("ROLLBACK");
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

fn to_sql_values(params: &[Value]) -> Result<Vec<SqlValue>, ExecError> {
    params.iter().map(to_sql_value).collect()
}

fn to_sql_value(value: &Value) -> Result<SqlValue, ExecError> {
    let converted = match value {
        Value::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
        Value::TinyInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::SmallInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
        Value::BigInt(Some(i)) => SqlValue::Integer(*i),
        Value::TinyUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::Unsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => {
            let signed = i64::try_from(*u).map_err(|_| {
                ExecError::Conversion(format!("BigUnsigned value {} exceeds i64::MAX", u))
            })?;
            SqlValue::Integer(signed)
        }
        Value::Float(Some(f)) => SqlValue::Real(f64::from(*f)),
        Value::Double(Some(d)) => SqlValue::Real(*d),
        Value::String(Some(s)) => SqlValue::Text(s.to_string()),
        Value::Bytes(Some(b)) => SqlValue::Blob(b.to_vec()),
        Value::Json(Some(j)) => SqlValue::Text(j.to_string()),
        Value::Uuid(Some(u)) => SqlValue::Text(u.to_string()),
        Value::ChronoDateTimeUtc(Some(dt)) => {
            SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        Value::ChronoDateTime(Some(dt)) => SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::ChronoDate(Some(d)) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::ChronoTime(Some(t)) => SqlValue::Text(t.format("%H:%M:%S").to_string()),
        Value::Bool(None)
        | Value::TinyInt(None)
        | Value::SmallInt(None)
        | Value::Int(None)
        | Value::BigInt(None)
        | Value::TinyUnsigned(None)
        | Value::SmallUnsigned(None)
        | Value::Unsigned(None)
        | Value::BigUnsigned(None)
        | Value::Float(None)
        | Value::Double(None)
        | Value::String(None)
        | Value::Bytes(None)
        | Value::Json(None)
        | Value::Uuid(None)
        | Value::ChronoDateTimeUtc(None)
        | Value::ChronoDateTime(None)
        | Value::ChronoDate(None)
        | Value::ChronoTime(None) => SqlValue::Null,
        other => {
            return Err(ExecError::Conversion(format!(
                "Unsupported value type in query: {:?}",
                other
            )))
        }
    };
    Ok(converted)
}

fn decode_column(value: ValueRef<'_>) -> Result<serde_json::Value, ExecError> {
    let decoded = match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ExecError::Conversion(format!("column is not valid UTF-8: {e}")))?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(bytes) => {
            serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
        }
    };
    Ok(decoded)
}
