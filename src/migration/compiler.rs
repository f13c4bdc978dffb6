//! Schema Compiler
//!
//! Compiles a [`Schema`] into forward and reverse DDL for one dialect, and
//! renders the result as migration source. Everything here is pure: nothing
//! touches a database.

use super::checksum::checksum_of;
use super::ddl;
use super::migration::Migration;
use super::ordering::creation_order;
use super::schema_manager::SchemaManager;
use crate::executor::Dialect;
use crate::migration::MigrationError;
use crate::schema::{to_toml, Schema, SchemaError};

/// Name used when a compiled migration is not given one.
pub const DEFAULT_MIGRATION_NAME: &str = "create_schema";

/// Forward and reverse DDL for a schema.
///
/// As a [`Migration`], `up` converges the database on the schema (creating
/// missing tables and diffing existing ones) and `down` drops every table.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMigration {
    pub name: String,
    pub version: i64,
    pub dialect: Dialect,
    /// CREATE statements in foreign-key dependency order
    pub up: Vec<String>,
    /// DROP statements in reverse dependency order
    pub down: Vec<String>,
    schema: Schema,
}

/// Compile a schema for a dialect.
///
/// # Errors
///
/// Returns `SchemaError::CyclicDependency` when the foreign keys form a cycle;
/// no DDL is produced in that case.
pub fn compile(schema: &Schema, dialect: Dialect) -> Result<CompiledMigration, SchemaError> {
    let order = creation_order(schema)?;
    let up = order.iter().flat_map(|node| ddl::create_table(node, dialect)).collect();
    let down = order
        .iter()
        .rev()
        .map(|node| ddl::drop_table(node.name(), dialect))
        .collect();

    Ok(CompiledMigration {
        name: DEFAULT_MIGRATION_NAME.to_string(),
        version: 0,
        dialect,
        up,
        down,
        schema: schema.clone(),
    })
}

impl CompiledMigration {
    pub fn named(mut self, name: &str, version: i64) -> Self {
        self.name = sanitize_name(name);
        self.version = version;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// SQL migration file text, with `-- migrate:up` and `-- migrate:down` sections.
    pub fn to_sql(&self) -> String {
        let mut out = format!("-- {} ({})\n-- migrate:up\n", self.name, self.dialect);
        for statement in &self.up {
            out.push_str(statement);
            out.push_str(";\n\n");
        }
        out.push_str("-- migrate:down\n");
        for statement in &self.down {
            out.push_str(statement);
            out.push_str(";\n");
        }
        out
    }
}

impl Migration for CompiledMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn checksum(&self) -> String {
        checksum_of(&self.up.join(";\n"))
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.sync(&self.schema).map(|_| ())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute_all(&self.down)
    }
}

/// Lowercase a migration name and replace anything outside `[a-z0-9_]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        DEFAULT_MIGRATION_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `m{version}_{name}.{extension}`
pub fn migration_file_name(version: i64, name: &str, extension: &str) -> String {
    format!("m{:014}_{}.{}", version, sanitize_name(name), extension)
}

/// Current UTC time as a migration version.
pub fn version_now() -> i64 {
    chrono::Utc::now()
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_default()
}

fn struct_name(name: &str, version: i64) -> String {
    let camel: String = sanitize_name(name)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    format!("M{}{}", version, camel)
}

/// Raw string literal that can hold `text` unescaped.
fn raw_literal(text: &str) -> String {
    let mut longest = 0;
    let mut run: Option<usize> = None;
    for c in text.chars() {
        run = match (c, run) {
            ('"', _) => Some(0),
            ('#', Some(n)) => {
                longest = longest.max(n + 1);
                Some(n + 1)
            }
            _ => None,
        };
    }
    let hashes = "#".repeat(longest + 1);
    format!("r{hashes}\"{text}\"{hashes}")
}

fn const_array(name: &str, statements: &[String]) -> String {
    let mut out = format!("pub const {}: &[&str] = &[\n", name);
    for statement in statements {
        out.push_str("    ");
        out.push_str(&raw_literal(statement));
        out.push_str(",\n");
    }
    out.push_str("];\n");
    out
}

/// Render a Rust migration module for `schema`.
///
/// The module embeds the schema description and the compiled DDL. Its `up`
/// converges the database on the embedded schema, so applying it to a
/// database that already has some of the tables adds, alters and drops
/// columns instead of failing.
pub fn generate_migration_source(
    schema: &Schema,
    dialect: Dialect,
    name: &str,
    version: i64,
) -> Result<String, SchemaError> {
    let compiled = compile(schema, dialect)?.named(name, version);
    let description = to_toml(schema)?;
    let struct_name = struct_name(&compiled.name, version);

    let mut out = String::new();
    out.push_str(&format!(
        "//! Migration `{}` (version {}), compiled for {}.\n\n",
        compiled.name, version, dialect
    ));
    out.push_str("use keel::migration::{checksum_of, Migration, MigrationError, SchemaManager};\n\n");
    out.push_str(&format!("pub const SCHEMA: &str = {};\n\n", raw_literal(&description)));
    out.push_str(&const_array("UP", &compiled.up));
    out.push('\n');
    out.push_str(&const_array("DOWN", &compiled.down));
    out.push('\n');
    out.push_str(&format!("pub struct {};\n\n", struct_name));
    out.push_str(&format!("impl Migration for {} {{\n", struct_name));
    out.push_str(&format!(
        "    fn name(&self) -> &str {{\n        \"{}\"\n    }}\n\n",
        compiled.name
    ));
    out.push_str(&format!("    fn version(&self) -> i64 {{\n        {}\n    }}\n\n", version));
    out.push_str("    fn checksum(&self) -> String {\n        checksum_of(&UP.join(\";\\n\"))\n    }\n\n");
    out.push_str(
        "    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {\n        \
         manager.sync_source(SCHEMA).map(|_| ())\n    }\n\n",
    );
    out.push_str(
        "    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {\n        \
         manager.execute_all(DOWN)\n    }\n",
    );
    out.push_str("}\n");
    Ok(out)
}
