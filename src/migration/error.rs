//! Migration-specific error types

use crate::error::{QueryError, TransactionError};
use crate::executor::ExecError;
use crate::schema::SchemaError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// The schema could not be compiled
    Schema(SchemaError),
    /// A DDL or bookkeeping statement failed
    Statement { sql: String, source: ExecError },
    /// Opening or committing the migration transaction failed
    Transaction(TransactionError),
    /// Migration file or directory not found
    FileNotFound(String),
    /// Invalid migration file format
    InvalidFormat(String),
    /// Checksum mismatch
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Two migrations share a version
    DuplicateVersion { version: i64, first: String, second: String },
    /// Migration failed during execution
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Applied migration is no longer available
    MissingFile { version: i64, name: String },
}

impl MigrationError {
    pub(crate) fn statement(sql: &str, source: ExecError) -> Self {
        MigrationError::Statement {
            sql: sql.to_string(),
            source,
        }
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Schema(e) => write!(f, "Schema error: {}", e),
            MigrationError::Statement { sql, source } => {
                write!(f, "Statement failed: {}\n  {}", source, sql.trim())
            }
            MigrationError::Transaction(e) => write!(f, "Transaction error: {}", e),
            MigrationError::FileNotFound(path) => write!(f, "Migration file not found: {}", path),
            MigrationError::InvalidFormat(msg) => write!(f, "Invalid migration format: {}", msg),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => {
                write!(
                    f,
                    "Migration '{}' (version {}) has been modified after being applied.\n\
                     Stored checksum: {}\n\
                     Current checksum: {}",
                    name, version, stored, current
                )
            }
            MigrationError::DuplicateVersion { version, first, second } => {
                write!(
                    f,
                    "Migrations '{}' and '{}' share version {}",
                    first, second, version
                )
            }
            MigrationError::ExecutionFailed { version, name, error } => {
                write!(
                    f,
                    "Migration '{}' (version {}) failed during execution: {}",
                    name, version, error
                )
            }
            MigrationError::MissingFile { version, name } => {
                write!(
                    f,
                    "Applied migration not found: m{}_{}\n\
                     Suggestion: Ensure all migration files are present in the migrations directory",
                    version, name
                )
            }
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Schema(e) => Some(e),
            MigrationError::Statement { source, .. } => Some(source),
            MigrationError::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for MigrationError {
    fn from(error: SchemaError) -> Self {
        MigrationError::Schema(error)
    }
}

impl From<TransactionError> for MigrationError {
    fn from(error: TransactionError) -> Self {
        MigrationError::Transaction(error)
    }
}

impl From<QueryError> for MigrationError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Execution { sql, source } => MigrationError::Statement { sql, source },
            other => MigrationError::InvalidFormat(other.to_string()),
        }
    }
}
