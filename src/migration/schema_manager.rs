//! SchemaManager - schema operations for migrations

use super::compiler::compile;
use super::ddl;
use super::diff::{table_statements, ColumnInfo};
use super::ordering::{creation_order, TableNode};
use crate::executor::{Dialect, Executor, Row};
use crate::migration::MigrationError;
use crate::schema::{parse_schema, Schema};

/// SchemaManager runs DDL and introspects existing tables for migrations.
///
/// It borrows the executor of the surrounding migration run, so the statements
/// it issues join that run's transaction.
pub struct SchemaManager<'a> {
    executor: &'a dyn Executor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    /// Execute one DDL statement
    pub fn execute(&self, sql: &str) -> Result<(), MigrationError> {
        log::debug!("DDL: {}", sql);
        self.executor
            .execute(sql, &[])
            .map(|_| ())
            .map_err(|e| MigrationError::statement(sql, e))
    }

    /// Execute statements in order, stopping at the first failure
    pub fn execute_all<S: AsRef<str>>(&self, statements: &[S]) -> Result<(), MigrationError> {
        statements.iter().try_for_each(|s| self.execute(s.as_ref()))
    }

    fn query(&self, sql: &str, params: &[sea_query::Value]) -> Result<Vec<Row>, MigrationError> {
        self.executor
            .query_all(sql, params)
            .map_err(|e| MigrationError::statement(sql, e))
    }

    /// Whether a table exists in the current database/schema
    pub fn table_exists(&self, table: &str) -> Result<bool, MigrationError> {
        let sql = match self.dialect() {
            Dialect::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            Dialect::Postgres => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1"
            }
            Dialect::MySql => {
                "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
        };
        Ok(!self.query(sql, &[table.into()])?.is_empty())
    }

    /// Columns of an existing table in storage order
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, MigrationError> {
        let sql = match self.dialect() {
            Dialect::Sqlite => r#"SELECT name, type, "notnull" AS not_null, pk FROM pragma_table_info(?)"#,
            Dialect::Postgres => {
                "SELECT a.attname AS name, format_type(a.atttypid, a.atttypmod) AS type, \
                 a.attnotnull AS not_null, \
                 EXISTS (SELECT 1 FROM pg_index i WHERE i.indrelid = a.attrelid AND i.indisprimary AND a.attnum = ANY(i.indkey)) AS pk \
                 FROM pg_attribute a WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped \
                 ORDER BY a.attnum"
            }
            Dialect::MySql => {
                "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS type, IS_NULLABLE = 'NO' AS not_null, COLUMN_KEY = 'PRI' AS pk \
                 FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION"
            }
        };

        self.query(sql, &[table.into()])?
            .iter()
            .map(|row| {
                let name = row.get("name").and_then(|v| v.as_str()).ok_or_else(|| {
                    MigrationError::InvalidFormat(format!("column listing for '{}' has no name", table))
                })?;
                Ok(ColumnInfo {
                    name: name.to_string(),
                    data_type: row.get("type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    nullable: !truthy(row.get("not_null")),
                    primary_key: truthy(row.get("pk")),
                })
            })
            .collect()
    }

    /// Names of the indexes on an existing table
    pub fn indexes(&self, table: &str) -> Result<Vec<String>, MigrationError> {
        let sql = match self.dialect() {
            Dialect::Sqlite => "SELECT name FROM pragma_index_list(?)",
            Dialect::Postgres => "SELECT indexname AS name FROM pg_indexes WHERE schemaname = current_schema() AND tablename = $1",
            Dialect::MySql => {
                "SELECT DISTINCT INDEX_NAME AS name FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
        };
        Ok(self
            .query(sql, &[table.into()])?
            .iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    /// Statements that bring the database in line with `schema`: missing
    /// tables are created in dependency order, existing model tables are diffed.
    pub fn plan_sync(&self, schema: &Schema) -> Result<Vec<String>, MigrationError> {
        let dialect = self.dialect();
        let mut statements = Vec::new();
        for node in creation_order(schema)? {
            if !self.table_exists(node.name())? {
                statements.extend(ddl::create_table(&node, dialect));
                continue;
            }
            if let TableNode::Model(model) = node {
                let existing = self.columns(&model.table)?;
                let indexes = self.indexes(&model.table)?;
                statements.extend(table_statements(model, &existing, &indexes, dialect));
            }
        }
        Ok(statements)
    }

    /// Apply [`SchemaManager::plan_sync`]. Running it again against the same
    /// schema issues nothing new. Returns the number of statements executed.
    pub fn sync(&self, schema: &Schema) -> Result<usize, MigrationError> {
        let statements = self.plan_sync(schema)?;
        self.execute_all(&statements)?;
        log::info!("Schema sync executed {} statement(s)", statements.len());
        Ok(statements.len())
    }

    /// Parse a TOML schema description and [`SchemaManager::sync`] it.
    pub fn sync_source(&self, source: &str) -> Result<usize, MigrationError> {
        self.sync(&parse_schema(source)?)
    }

    /// Drop every table of `schema` in reverse dependency order.
    pub fn drop_schema(&self, schema: &Schema) -> Result<(), MigrationError> {
        self.execute_all(&compile(schema, self.dialect())?.down)
    }

    /// Parse a TOML schema description and [`SchemaManager::drop_schema`] it.
    pub fn drop_source(&self, source: &str) -> Result<(), MigrationError> {
        self.drop_schema(&parse_schema(source)?)
    }
}

fn truthy(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(serde_json::Value::String(s)) => matches!(s.as_str(), "1" | "t" | "true" | "YES"),
        _ => false,
    }
}
