//! Differential comparison of a model against an existing table.
//!
//! Columns only in the schema are added, columns whose type or nullability
//! changed are modified, and columns only in storage are dropped. The primary
//! key is never modified or dropped. Foreign keys of BelongsTo relations are
//! ordinary fields here, so their nullability is reconciled like any column.
//!
//! SQLite alters little in place. A table whose changes it cannot express as
//! ALTER TABLE is rebuilt instead.

use super::ddl;
use crate::executor::Dialect;
use crate::schema::{FieldSpec, ModelDefinition, RelationKind};

/// A column as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// One difference between a model and its table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    Add(FieldSpec),
    Modify { field: FieldSpec, current: ColumnInfo },
    Drop(String),
}

impl ColumnChange {
    /// DDL applying this change to `table`.
    pub fn statements(&self, table: &str, dialect: Dialect, existing_indexes: &[String]) -> Vec<String> {
        match self {
            ColumnChange::Add(field) => ddl::add_column(table, field, dialect, existing_indexes),
            ColumnChange::Modify { field, .. } => ddl::modify_column(table, field, dialect),
            ColumnChange::Drop(column) => vec![ddl::drop_column(table, column, dialect)],
        }
    }
}

/// Changes needed to bring `existing` in line with `model`, in field order
/// followed by drops in storage order.
pub fn diff_columns(model: &ModelDefinition, existing: &[ColumnInfo], dialect: Dialect) -> Vec<ColumnChange> {
    let mut changes = Vec::new();

    for field in &model.fields {
        match existing.iter().find(|c| c.name == field.name) {
            None => changes.push(ColumnChange::Add(field.clone())),
            Some(current) if !field.is_primary_key() && !current.primary_key => {
                let type_changed =
                    ddl::normalize_type(&current.data_type) != ddl::normalize_type(ddl::column_type(field, dialect));
                if type_changed || current.nullable != field.nullable {
                    changes.push(ColumnChange::Modify {
                        field: field.clone(),
                        current: current.clone(),
                    });
                }
            }
            Some(_) => {}
        }
    }

    for column in existing {
        if column.primary_key || model.field(&column.name).is_some() {
            continue;
        }
        changes.push(ColumnChange::Drop(column.name.clone()));
    }
    changes
}

/// Whether SQLite needs a table rebuild to apply `change` to `model`'s table.
fn needs_rebuild(model: &ModelDefinition, change: &ColumnChange) -> bool {
    match change {
        ColumnChange::Modify { .. } | ColumnChange::Drop(_) => true,
        ColumnChange::Add(field) => !ddl::sqlite_can_add(field) || is_foreign_key(model, &field.name),
    }
}

fn is_foreign_key(model: &ModelDefinition, column: &str) -> bool {
    model
        .relations
        .iter()
        .any(|r| matches!(&r.kind, RelationKind::BelongsTo { foreign_key, .. } if foreign_key == column))
}

/// DDL bringing an existing table in line with `model`.
pub fn table_statements(
    model: &ModelDefinition,
    existing: &[ColumnInfo],
    existing_indexes: &[String],
    dialect: Dialect,
) -> Vec<String> {
    let changes = diff_columns(model, existing, dialect);
    if dialect == Dialect::Sqlite && changes.iter().any(|c| needs_rebuild(model, c)) {
        log::info!("rebuilding table '{}' to apply {} change(s)", model.table, changes.len());
        return ddl::rebuild_table(model, existing);
    }
    changes
        .iter()
        .flat_map(|c| c.statements(&model.table, dialect, existing_indexes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelBuilder, Schema};

    fn column(name: &str, ty: &str, nullable: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: ty.to_string(),
            nullable,
            primary_key: name == "id",
        }
    }

    fn post() -> Schema {
        Schema::builder()
            .model(ModelBuilder::new("User").id())
            .model(
                ModelBuilder::new("Post")
                    .id()
                    .string("title", false)
                    .text("body", true)
                    .belongs_to("User")
                    .nullable(true),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn matching_table_needs_no_changes() {
        let schema = post();
        let existing = vec![
            column("id", "CHAR(36)", false),
            column("title", "VARCHAR(255)", false),
            column("body", "TEXT", true),
            column("user_id", "char(36)", true),
        ];
        assert!(diff_columns(schema.model("post").unwrap(), &existing, Dialect::Sqlite).is_empty());
    }

    #[test]
    fn adds_modifies_and_drops() {
        let schema = post();
        let existing = vec![
            column("id", "int", false),
            column("title", "varchar(255)", true),
            column("legacy", "text", true),
            column("user_id", "char(36)", false),
        ];
        let changes = diff_columns(schema.model("post").unwrap(), &existing, Dialect::MySql);

        assert_eq!(changes.len(), 4);
        assert!(matches!(&changes[0], ColumnChange::Modify { field, .. } if field.name == "title"));
        assert!(matches!(&changes[1], ColumnChange::Add(field) if field.name == "body"));
        assert!(matches!(&changes[2], ColumnChange::Modify { field, .. } if field.name == "user_id" && field.nullable));
        assert_eq!(changes[3], ColumnChange::Drop("legacy".to_string()));

        assert_eq!(
            changes[0].statements("post", Dialect::MySql, &[]),
            vec!["ALTER TABLE `post` MODIFY COLUMN `title` varchar(255) NOT NULL".to_string()]
        );
    }

    #[test]
    fn postgres_modify_changes_type_and_nullability() {
        let schema = post();
        let existing = vec![column("id", "character(36)", false), column("title", "text", false)];
        let changes = diff_columns(schema.model("post").unwrap(), &existing, Dialect::Postgres);
        assert_eq!(
            changes[0].statements("post", Dialect::Postgres, &[]),
            vec![
                r#"ALTER TABLE "post" ALTER COLUMN "title" TYPE character varying(255) USING "title"::character varying(255)"#
                    .to_string(),
                r#"ALTER TABLE "post" ALTER COLUMN "title" SET NOT NULL"#.to_string(),
            ]
        );
    }

    #[test]
    fn sqlite_rebuilds_instead_of_altering_in_place() {
        let schema = post();
        let model = schema.model("post").unwrap();
        let existing = vec![
            column("id", "char(36)", false),
            column("title", "varchar(255)", true),
            column("body", "text", true),
            column("user_id", "char(36)", true),
        ];
        let sql = table_statements(model, &existing, &[], Dialect::Sqlite);
        assert_eq!(sql.first().unwrap(), "PRAGMA foreign_keys = OFF");
        assert!(sql.iter().any(|s| s == r#"ALTER TABLE "__new_post" RENAME TO "post""#));

        let existing = vec![
            column("id", "char(36)", false),
            column("title", "varchar(255)", false),
            column("user_id", "char(36)", true),
        ];
        assert_eq!(
            table_statements(model, &existing, &[], Dialect::Sqlite),
            vec![r#"ALTER TABLE "post" ADD COLUMN "body" text NULL"#.to_string()]
        );
    }

    #[test]
    fn new_foreign_key_column_forces_a_sqlite_rebuild() {
        let schema = post();
        let existing = vec![
            column("id", "char(36)", false),
            column("title", "varchar(255)", false),
            column("body", "text", true),
        ];
        let sql = table_statements(schema.model("post").unwrap(), &existing, &[], Dialect::Sqlite);
        assert!(sql.iter().any(|s| s.contains(r#"FOREIGN KEY ("user_id") REFERENCES "user" ("id")"#)));
        assert!(sql.iter().any(|s| s.starts_with(r#"INSERT INTO "__new_post" ("id", "title", "body")"#)));
    }
}
