//! # Keel
//!
//! Schema-driven relational data access over SQLite.
//!
//! - [`schema`]: declarative models, fields and relations
//! - [`migration`]: compile a schema to ordered DDL, sync it idempotently and
//!   run versioned migrations
//! - [`query`]: parameterized statement builder and find options
//! - [`relation`]: relation registry and eager loader
//! - [`store`]: transactional create/find/update/delete facade with nested
//!   relation writes

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod migration;
pub mod naming;
pub mod query;
pub mod relation;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod value;

#[cfg(feature = "tracing")]
pub mod tracing_helpers;

#[cfg(test)]
mod test_support;

pub use config::KeelConfig;
pub use connection::{connect, ConnectionError, SqliteExecutor};
pub use error::{KeelError, QueryError, TransactionError};
pub use executor::{Dialect, ExecError, ExecResult, Executor, Row};
pub use schema::{ModelBuilder, Schema, SchemaError};
pub use store::{Catalog, Store, WriteOptions};
pub use transaction::{run_in_transaction, TransactionGuard};
