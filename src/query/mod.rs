//! Query Builder
//!
//! Turns predicate, order and paging specs into parameterized SQL through
//! sea-query. Every value is bound as a parameter; identical input always
//! yields identical SQL text and parameter order.
//!
//! ```
//! use keel::query::QueryBuilder;
//! use keel::Dialect;
//! use serde_json::json;
//!
//! let stmt = QueryBuilder::table("user")
//!     .filter(&json!({"status": "active", "OR": [{"role": "admin"}, {"role": "owner"}]}))?
//!     .build_select(Dialect::Sqlite);
//!
//! assert!(stmt.sql.ends_with(r#"WHERE "status" = ? AND ("role" = ? OR "role" = ?)"#));
//! assert_eq!(stmt.values, vec!["active".into(), "admin".into(), "owner".into()]);
//! # Ok::<(), keel::QueryError>(())
//! ```

pub mod builder;
pub mod condition;
pub mod options;

pub use builder::QueryBuilder;
pub use condition::{Condition, Operator, Predicate};
pub use options::{Direction, FindOptions, Include, OrderBy, RelationOptions};

use crate::error::QueryError;
use crate::executor::{ExecResult, Executor, Row};
use sea_query::Iden;

/// Runtime identifier for tables and columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident(name.into())
    }
}

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// Compiled statement: SQL text plus bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<sea_query::Value>,
}

impl Statement {
    pub(crate) fn from_parts((sql, values): (String, sea_query::Values)) -> Self {
        Statement {
            sql,
            values: values.0,
        }
    }

    /// Run a row-returning statement.
    pub fn fetch_all(&self, executor: &dyn Executor) -> Result<Vec<Row>, QueryError> {
        executor
            .query_all(&self.sql, &self.values)
            .map_err(|e| QueryError::execution(&self.sql, e))
    }

    /// Run a statement that returns no rows.
    pub fn execute(&self, executor: &dyn Executor) -> Result<ExecResult, QueryError> {
        executor
            .execute(&self.sql, &self.values)
            .map_err(|e| QueryError::execution(&self.sql, e))
    }
}
