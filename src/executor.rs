//! Executor Module
//!
//! Provides the [`Executor`] trait, the narrow driver interface the rest of the
//! crate is written against. Statements arrive as SQL text plus an ordered list
//! of bind values; rows come back as ordered JSON maps keyed by column name.
//!
//! The bundled implementation is [`crate::connection::SqliteExecutor`]. Other
//! backends are plugged in by implementing this trait.

use sea_query::{DeleteStatement, InsertStatement, SelectStatement, UpdateStatement, Values};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A fetched row: column name to JSON value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Driver error type
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Error reported by the bundled SQLite driver
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A bind value or a column value could not be converted
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Other execution errors
    #[error("Execution error: {0}")]
    Other(String),
}

impl ExecError {
    /// True when the store refused the statement because of a constraint
    /// (unique, foreign key, not null, check).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            ExecError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Outcome of a statement that does not return rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// SQL dialect spoken by a backing store.
///
/// The dialect picks the placeholder style and identifier quoting for data
/// statements and the vendor type and default clauses for DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
}

impl Dialect {
    /// Quote an identifier for hand-assembled DDL.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(ExecError::Other(format!("unknown dialect '{other}'"))),
        }
    }
}

/// Render a sea-query statement with the builder matching a [`Dialect`].
pub trait BuildFor {
    fn build_for(&self, dialect: Dialect) -> (String, Values);
}

macro_rules! impl_build_for {
    ($($stmt:ty),* $(,)?) => {
        $(
            impl BuildFor for $stmt {
                fn build_for(&self, dialect: Dialect) -> (String, Values) {
                    match dialect {
                        Dialect::Sqlite => self.build(sea_query::SqliteQueryBuilder),
                        Dialect::Postgres => self.build(sea_query::PostgresQueryBuilder),
                        Dialect::MySql => self.build(sea_query::MysqlQueryBuilder),
                    }
                }
            }
        )*
    };
}

impl_build_for!(SelectStatement, InsertStatement, UpdateStatement, DeleteStatement);

/// Trait for executing database operations
///
/// All methods take `&self`: one executor is one connection context serving one
/// logical unit of work at a time. Transactions are strictly sequential
/// (begin, N statements, commit or roll back).
///
/// # Examples
///
/// ```no_run
/// use keel::{Executor, SqliteExecutor};
///
/// # fn main() -> Result<(), keel::ExecError> {
/// let executor = SqliteExecutor::open_in_memory()?;
/// executor.execute("CREATE TABLE tag (id TEXT PRIMARY KEY, label TEXT)", &[])?;
/// executor.execute("INSERT INTO tag (id, label) VALUES (?, ?)", &["t1".into(), "rust".into()])?;
/// let rows = executor.query_all("SELECT label FROM tag", &[])?;
/// assert_eq!(rows[0]["label"], "rust");
/// # Ok(())
/// # }
/// ```
pub trait Executor {
    /// Dialect used to render statements for this executor
    fn dialect(&self) -> Dialect;

    /// Execute a statement that does not return rows
    ///
    /// # Errors
    ///
    /// Returns `ExecError` if the statement fails or a bind value cannot be converted.
    fn execute(&self, sql: &str, params: &[sea_query::Value]) -> Result<ExecResult, ExecError>;

    /// Execute a query and return every row
    ///
    /// # Errors
    ///
    /// Returns `ExecError` if the query fails or a column value cannot be decoded.
    fn query_all(&self, sql: &str, params: &[sea_query::Value]) -> Result<Vec<Row>, ExecError>;

    /// Execute a query and return the first row, if any
    fn query_first(&self, sql: &str, params: &[sea_query::Value]) -> Result<Option<Row>, ExecError> {
        Ok(self.query_all(sql, params)?.into_iter().next())
    }

    fn begin_transaction(&self) -> Result<(), ExecError>;

    fn commit(&self) -> Result<(), ExecError>;

    fn roll_back(&self) -> Result<(), ExecError>;

    /// Whether a transaction is currently open on this connection
    fn in_transaction(&self) -> bool;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute(&self, sql: &str, params: &[sea_query::Value]) -> Result<ExecResult, ExecError> {
        (**self).execute(sql, params)
    }

    fn query_all(&self, sql: &str, params: &[sea_query::Value]) -> Result<Vec<Row>, ExecError> {
        (**self).query_all(sql, params)
    }

    fn begin_transaction(&self) -> Result<(), ExecError> {
        (**self).begin_transaction()
    }

    fn commit(&self) -> Result<(), ExecError> {
        (**self).commit()
    }

    fn roll_back(&self) -> Result<(), ExecError> {
        (**self).roll_back()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}
