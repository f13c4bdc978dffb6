//! Error types shared across the crate.
//!
//! Each layer owns its own error enum; [`KeelError`] is the union returned by
//! the data-access facade so callers can match on the failure class.

use crate::executor::ExecError;
use crate::migration::MigrationError;
use crate::schema::SchemaError;

/// Failures while compiling or executing a data statement.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The caller supplied a predicate, order or option shape that cannot be compiled.
    #[error("malformed query: {0}")]
    Malformed(String),

    /// An include or relation write named a relation the model does not declare.
    #[error("model '{model}' has no relation named '{relation}'")]
    UnknownRelation { model: String, relation: String },

    /// The table is not part of the loaded schema.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// The backing store rejected the statement.
    #[error("statement failed: {source} [{sql}]")]
    Execution {
        sql: String,
        #[source]
        source: ExecError,
    },
}

impl QueryError {
    pub(crate) fn execution(sql: &str, source: ExecError) -> Self {
        QueryError::Execution {
            sql: sql.to_string(),
            source,
        }
    }

    /// True when the store refused the statement because of a constraint,
    /// such as a duplicate value in a unique column.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, QueryError::Execution { source, .. } if source.is_constraint_violation())
    }
}

/// Failures while opening, committing or rolling back a transaction.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] ExecError),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] ExecError),

    /// The unit of work failed and the rollback that followed failed too.
    #[error("rollback failed ({rollback}) after: {cause}")]
    RollbackFailed {
        cause: Box<KeelError>,
        rollback: ExecError,
    },
}

/// Top-level error returned by the data-access facade.
#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Raised only by unique lookups that match nothing.
    #[error("no '{table}' row matched the unique lookup")]
    NotFound { table: String },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl KeelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeelError::NotFound { .. })
    }

    pub fn as_query(&self) -> Option<&QueryError> {
        match self {
            KeelError::Query(e) => Some(e),
            KeelError::Transaction(TransactionError::RollbackFailed { cause, .. }) => cause.as_query(),
            _ => None,
        }
    }
}
