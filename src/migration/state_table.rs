//! Migration state table management
//!
//! The state table records one row per applied migration: version, name,
//! checksum, when it was applied and how long it took.

use crate::executor::{Dialect, Executor, Row};
use crate::migration::{MigrationError, MigrationRecord};
use crate::query::{Direction, QueryBuilder};
use serde_json::json;

/// `CREATE TABLE IF NOT EXISTS` for the state table, plus its `applied_at`
/// index (inline on MySQL, which has no `CREATE INDEX IF NOT EXISTS`).
pub fn create_state_table(table: &str, dialect: Dialect) -> Vec<String> {
    let quoted = dialect.quote(table);
    let index = dialect.quote(&format!("idx_{}_applied_at", table));
    let columns = "version BIGINT NOT NULL PRIMARY KEY,\n    \
                   name VARCHAR(255) NOT NULL,\n    \
                   checksum VARCHAR(64) NOT NULL,\n    \
                   applied_at TIMESTAMP NOT NULL,\n    \
                   execution_time_ms BIGINT,\n    \
                   success BOOLEAN NOT NULL DEFAULT TRUE";

    match dialect {
        Dialect::MySql => vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    INDEX {} (applied_at)\n)",
            quoted, columns, index
        )],
        Dialect::Sqlite | Dialect::Postgres => vec![
            format!("CREATE TABLE IF NOT EXISTS {} (\n    {}\n)", quoted, columns),
            format!("CREATE INDEX IF NOT EXISTS {} ON {} (applied_at)", index, quoted),
        ],
    }
}

/// Create the state table and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn Executor, table: &str) -> Result<(), MigrationError> {
    for sql in create_state_table(table, executor.dialect()) {
        executor
            .execute(&sql, &[])
            .map_err(|e| MigrationError::statement(&sql, e))?;
    }
    Ok(())
}

/// Applied migrations, oldest first.
pub fn query_applied(executor: &dyn Executor, table: &str) -> Result<Vec<MigrationRecord>, MigrationError> {
    QueryBuilder::table(table)
        .select(["version", "name", "checksum", "applied_at", "execution_time_ms", "success"])
        .order_by("version", Direction::Asc)
        .build_select(executor.dialect())
        .fetch_all(executor)?
        .iter()
        .map(MigrationRecord::from_row)
        .collect()
}

pub fn record_migration(executor: &dyn Executor, table: &str, record: &MigrationRecord) -> Result<(), MigrationError> {
    let row: Row = match json!({
        "version": record.version,
        "name": record.name,
        "checksum": record.checksum,
        "applied_at": record.applied_at.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        "execution_time_ms": record.execution_time_ms,
        "success": record.success,
    }) {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    };
    QueryBuilder::build_insert(table, &row, executor.dialect())?.execute(executor)?;
    Ok(())
}

pub fn remove_migration_record(executor: &dyn Executor, table: &str, version: i64) -> Result<(), MigrationError> {
    QueryBuilder::table(table)
        .filter(&json!({ "version": version }))?
        .build_delete(executor.dialect())?
        .execute(executor)?;
    Ok(())
}
