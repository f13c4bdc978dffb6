//! Schema compiler and migration system
//!
//! This module turns a [`crate::schema::Schema`] into DDL and keeps databases
//! in step with it:
//! - [`compile`] orders tables by foreign-key dependency and produces
//!   forward/reverse DDL
//! - [`SchemaManager::sync`] diffs live tables against the schema and only
//!   issues what is missing (idempotent)
//! - [`Migrator`] applies versioned [`Migration`]s and records them with a
//!   checksum in a state table
//!
//! # Example
//!
//! ```rust,no_run
//! use keel::migration::{Migration, MigrationError, SchemaManager};
//!
//! pub struct CreateUsersTable;
//!
//! impl Migration for CreateUsersTable {
//!     fn name(&self) -> &str {
//!         "create_users_table"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20240120120000
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         manager.execute(r#"CREATE TABLE IF NOT EXISTS "user" ("id" char(36) NOT NULL PRIMARY KEY)"#)
//!     }
//!
//!     fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         manager.execute(r#"DROP TABLE IF EXISTS "user""#)
//!     }
//! }
//! ```

pub mod checksum;
pub mod compiler;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod file;
pub mod migration;
pub mod migrator;
pub mod ordering;
pub mod record;
pub mod schema_manager;
pub mod state_table;
pub mod status;

pub use checksum::{calculate_checksum, checksum_of};
pub use compiler::{compile, generate_migration_source, migration_file_name, version_now, CompiledMigration};
pub use diff::{diff_columns, table_statements, ColumnChange, ColumnInfo};
pub use error::MigrationError;
pub use file::{discover_migrations, MigrationFile, MigrationKind, SqlMigration};
pub use migration::Migration;
pub use migrator::Migrator;
pub use ordering::{creation_order, TableNode};
pub use record::MigrationRecord;
pub use schema_manager::SchemaManager;
pub use state_table::initialize_state_table;
pub use status::{ChecksumDrift, MigrationStatus, PendingMigration};
