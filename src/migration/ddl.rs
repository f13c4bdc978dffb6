//! Textual DDL per dialect.
//!
//! Schema-change statements are assembled as text; they carry no bound values.
//! Literal defaults are escaped here and nowhere else.

use super::diff::ColumnInfo;
use super::ordering::TableNode;
use crate::executor::Dialect;
use crate::schema::{DefaultValue, FieldSpec, FieldType, ModelDefinition, PivotTable, ReferentialAction, RelationKind};

/// Whether a column definition is for CREATE TABLE or for ALTER TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Create,
    Alter,
}

/// Vendor type for a field, spelled the way the store reports it back.
pub fn column_type(field: &FieldSpec, dialect: Dialect) -> &'static str {
    if field.is_auto_increment() && dialect == Dialect::Sqlite {
        return "integer";
    }
    match dialect {
        Dialect::MySql => match field.ty {
            FieldType::Identifier => "char(36)",
            FieldType::String => "varchar(255)",
            FieldType::Text => "text",
            FieldType::Integer => "int",
            FieldType::BigInteger => "bigint",
            FieldType::Float => "double",
            FieldType::Decimal => "decimal(10,2)",
            FieldType::Boolean => "tinyint(1)",
            FieldType::DateTime => "timestamp",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Json => "json",
        },
        Dialect::Postgres => match field.ty {
            FieldType::Identifier => "character(36)",
            FieldType::String => "character varying(255)",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::BigInteger => "bigint",
            FieldType::Float => "double precision",
            FieldType::Decimal => "numeric(10,2)",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "timestamp without time zone",
            FieldType::Date => "date",
            FieldType::Time => "time without time zone",
            FieldType::Json => "jsonb",
        },
        Dialect::Sqlite => match field.ty {
            FieldType::Identifier => "char(36)",
            FieldType::String => "varchar(255)",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::BigInteger => "bigint",
            FieldType::Float => "real",
            FieldType::Decimal => "decimal(10,2)",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Json => "json",
        },
    }
}

/// Normalized spelling used to compare declared and introspected types.
pub fn normalize_type(ty: &str) -> String {
    let lowered = ty.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let lowered = lowered.replace(", ", ",");
    for int_type in ["int", "bigint", "smallint", "mediumint"] {
        if let Some(rest) = lowered.strip_prefix(int_type) {
            if rest.starts_with('(') && rest.ends_with(')') {
                return int_type.to_string();
            }
        }
    }
    lowered
}

fn literal(value: &serde_json::Value, dialect: Dialect) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => match (dialect, b) {
            (Dialect::Postgres, true) => "TRUE".to_string(),
            (Dialect::Postgres, false) => "FALSE".to_string(),
            (_, true) => "1".to_string(),
            (_, false) => "0".to_string(),
        },
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// The DEFAULT clause of a field, if the dialect can express it.
fn default_clause(field: &FieldSpec, dialect: Dialect) -> Option<String> {
    match field.default_value()? {
        DefaultValue::Uuid => match dialect {
            Dialect::MySql => Some("DEFAULT (UUID())".to_string()),
            Dialect::Postgres => Some("DEFAULT gen_random_uuid()".to_string()),
            Dialect::Sqlite => None,
        },
        DefaultValue::CurrentTimestamp => Some("DEFAULT CURRENT_TIMESTAMP".to_string()),
        DefaultValue::Value(v) => Some(format!("DEFAULT {}", literal(v, dialect))),
    }
}

fn column_definition(field: &FieldSpec, dialect: Dialect, context: Context) -> String {
    let mut parts = vec![dialect.quote(&field.name), column_type(field, dialect).to_string()];
    let primary = field.is_primary_key() && context == Context::Create;

    if primary && field.is_auto_increment() {
        match dialect {
            Dialect::Sqlite => parts.push("PRIMARY KEY AUTOINCREMENT".to_string()),
            Dialect::MySql => parts.push("NOT NULL AUTO_INCREMENT PRIMARY KEY".to_string()),
            Dialect::Postgres => parts.push("GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY".to_string()),
        }
        return parts.join(" ");
    }

    let nullable = field.nullable && !field.is_primary_key();
    parts.push(if nullable { "NULL" } else { "NOT NULL" }.to_string());
    if let Some(default) = default_clause(field, dialect) {
        parts.push(default);
    }
    if field.auto_updates() && dialect == Dialect::MySql {
        parts.push("ON UPDATE CURRENT_TIMESTAMP".to_string());
    }
    if primary {
        parts.push("PRIMARY KEY".to_string());
    } else if field.is_unique() && context == Context::Create {
        parts.push("UNIQUE".to_string());
    }
    parts.join(" ")
}

fn index_name(table: &str, column: &str) -> String {
    format!("idx_{}_{}", table, column)
}

fn unique_index_name(table: &str, column: &str) -> String {
    format!("uniq_{}_{}", table, column)
}

/// Fields that get a plain secondary index.
fn indexed_fields(model: &ModelDefinition) -> impl Iterator<Item = &FieldSpec> {
    model
        .fields
        .iter()
        .filter(|f| f.is_indexed() && !f.is_unique() && !f.is_primary_key())
}

/// `CREATE INDEX IF NOT EXISTS` for one column.
pub fn create_index(table: &str, column: &str, dialect: Dialect) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        dialect.quote(&index_name(table, column)),
        dialect.quote(table),
        dialect.quote(column)
    )
}

fn create_unique_index(table: &str, column: &str, dialect: Dialect) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        dialect.quote(&unique_index_name(table, column)),
        dialect.quote(table),
        dialect.quote(column)
    )
}

/// Column, foreign key and (MySQL) index lines of a model's CREATE TABLE.
fn model_table_body(model: &ModelDefinition, dialect: Dialect) -> String {
    let mut lines: Vec<String> = model
        .fields
        .iter()
        .map(|f| column_definition(f, dialect, Context::Create))
        .collect();

    for relation in &model.relations {
        if let RelationKind::BelongsTo {
            foreign_key,
            owner_key,
            on_delete,
        } = &relation.kind
        {
            let action = on_delete.unwrap_or(ReferentialAction::Cascade);
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                dialect.quote(foreign_key),
                dialect.quote(&relation.target),
                dialect.quote(owner_key),
                action.as_sql()
            ));
        }
    }

    if dialect == Dialect::MySql {
        for field in indexed_fields(model) {
            lines.push(format!(
                "INDEX {} ({})",
                dialect.quote(&index_name(&model.table, &field.name)),
                dialect.quote(&field.name)
            ));
        }
    }
    lines.join(",\n    ")
}

/// CREATE TABLE for a model, followed by its secondary indexes.
pub fn create_model_table(model: &ModelDefinition, dialect: Dialect) -> Vec<String> {
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        dialect.quote(&model.table),
        model_table_body(model, dialect)
    )];
    if dialect != Dialect::MySql {
        statements.extend(indexed_fields(model).map(|f| create_index(&model.table, &f.name, dialect)));
    }
    statements
}

/// CREATE TABLE for a pivot: both keys, both foreign keys and a composite primary key.
pub fn create_pivot_table(pivot: &PivotTable, dialect: Dialect) -> Vec<String> {
    let mut lines: Vec<String> = pivot
        .keys
        .iter()
        .map(|key| {
            let spec = FieldSpec::new(key.column.clone(), key.ty, false);
            column_definition(&spec, dialect, Context::Create)
        })
        .collect();
    for key in &pivot.keys {
        lines.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
            dialect.quote(&key.column),
            dialect.quote(&key.table),
            dialect.quote(&key.references)
        ));
    }
    lines.push(format!(
        "PRIMARY KEY ({}, {})",
        dialect.quote(&pivot.keys[0].column),
        dialect.quote(&pivot.keys[1].column)
    ));
    vec![format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        dialect.quote(&pivot.name),
        lines.join(",\n    ")
    )]
}

pub fn create_table(node: &TableNode<'_>, dialect: Dialect) -> Vec<String> {
    match node {
        TableNode::Model(model) => create_model_table(model, dialect),
        TableNode::Pivot(pivot) => create_pivot_table(pivot, dialect),
    }
}

pub fn drop_table(table: &str, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.quote(table))
}

/// Whether SQLite can add `field` with ALTER TABLE ADD COLUMN: it takes
/// only constant defaults and needs one for a NOT NULL column.
pub fn sqlite_can_add(field: &FieldSpec) -> bool {
    match field.default_value() {
        Some(DefaultValue::Value(_)) => true,
        Some(_) => false,
        None => field.nullable,
    }
}

/// ALTER TABLE ADD COLUMN, plus a unique or plain index for the column unless
/// `existing_indexes` already names it.
pub fn add_column(table: &str, field: &FieldSpec, dialect: Dialect, existing_indexes: &[String]) -> Vec<String> {
    let mut statements = vec![format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote(table),
        column_definition(field, dialect, Context::Alter)
    )];
    let index = if field.is_unique() {
        Some(unique_index_name(table, &field.name))
    } else if field.is_indexed() {
        Some(index_name(table, &field.name))
    } else {
        None
    };
    let Some(index) = index else {
        return statements;
    };
    if existing_indexes.contains(&index) {
        return statements;
    }
    statements.push(match (dialect, field.is_unique()) {
        (Dialect::MySql, true) => format!(
            "ALTER TABLE {} ADD UNIQUE INDEX {} ({})",
            dialect.quote(table),
            dialect.quote(&index),
            dialect.quote(&field.name)
        ),
        (Dialect::MySql, false) => format!(
            "ALTER TABLE {} ADD INDEX {} ({})",
            dialect.quote(table),
            dialect.quote(&index),
            dialect.quote(&field.name)
        ),
        (_, true) => create_unique_index(table, &field.name, dialect),
        (_, false) => create_index(table, &field.name, dialect),
    });
    statements
}

/// SQLite table rebuild: create `__new_{table}` in the model's shape, copy
/// the columns both share, drop the old table and rename the new one.
///
/// Foreign key enforcement is switched off around the swap so dropping the
/// old table cascades to nothing. SQLite ignores that switch inside a
/// transaction.
pub fn rebuild_table(model: &ModelDefinition, existing: &[ColumnInfo]) -> Vec<String> {
    let dialect = Dialect::Sqlite;
    let table = dialect.quote(&model.table);
    let staging = dialect.quote(&format!("__new_{}", model.table));

    let shared: Vec<&FieldSpec> = model
        .fields
        .iter()
        .filter(|f| existing.iter().any(|c| c.name == f.name))
        .collect();
    let targets: Vec<String> = shared.iter().map(|f| dialect.quote(&f.name)).collect();
    let sources: Vec<String> = shared
        .iter()
        .map(|f| match f.default_value() {
            Some(DefaultValue::Value(v)) if !f.nullable => {
                format!("COALESCE({}, {})", dialect.quote(&f.name), literal(v, dialect))
            }
            _ => dialect.quote(&f.name),
        })
        .collect();

    let mut statements = vec![
        "PRAGMA foreign_keys = OFF".to_string(),
        format!("DROP TABLE IF EXISTS {}", staging),
        format!("CREATE TABLE {} (\n    {}\n)", staging, model_table_body(model, dialect)),
    ];
    if !shared.is_empty() {
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            staging,
            targets.join(", "),
            sources.join(", "),
            table
        ));
    }
    statements.push(format!("DROP TABLE {}", table));
    statements.push(format!("ALTER TABLE {} RENAME TO {}", staging, table));
    statements.extend(indexed_fields(model).map(|f| create_index(&model.table, &f.name, dialect)));
    statements.push("PRAGMA foreign_keys = ON".to_string());
    statements
}

/// Statements changing a column's type and nullability. SQLite cannot alter
/// columns in place; its changes go through [`rebuild_table`].
pub fn modify_column(table: &str, field: &FieldSpec, dialect: Dialect) -> Vec<String> {
    let quoted_table = dialect.quote(table);
    let column = dialect.quote(&field.name);
    match dialect {
        Dialect::MySql => vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            quoted_table,
            column_definition(field, dialect, Context::Alter)
        )],
        Dialect::Postgres => {
            let ty = column_type(field, dialect);
            vec![
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                    quoted_table, column, ty, column, ty
                ),
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    quoted_table,
                    column,
                    if field.nullable { "DROP NOT NULL" } else { "SET NOT NULL" }
                ),
            ]
        }
        Dialect::Sqlite => {
            log::warn!("'{}.{}' can only change through a table rebuild", table, field.name);
            Vec::new()
        }
    }
}

pub fn drop_column(table: &str, column: &str, dialect: Dialect) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        dialect.quote(table),
        dialect.quote(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelBuilder, Schema};

    fn blog() -> Schema {
        Schema::builder()
            .model(
                ModelBuilder::new("User")
                    .id()
                    .string("name", false)
                    .unique()
                    .integer("score", true)
                    .default(0)
                    .index()
                    .datetime("updated_at", false),
            )
            .model(ModelBuilder::new("Post").id().string("title", false).belongs_to("User").belongs_to_many("Tag"))
            .model(ModelBuilder::new("Tag").id().string("label", false))
            .build()
            .unwrap()
    }

    #[test]
    fn mysql_model_table_carries_defaults_and_inline_index() {
        let schema = blog();
        let sql = create_model_table(schema.model("user").unwrap(), Dialect::MySql);
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS `user` (\n    \
             `id` char(36) NOT NULL DEFAULT (UUID()) PRIMARY KEY,\n    \
             `name` varchar(255) NOT NULL UNIQUE,\n    \
             `score` int NULL DEFAULT 0,\n    \
             `updated_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,\n    \
             INDEX `idx_user_score` (`score`)\n)"
        );
    }

    #[test]
    fn foreign_keys_are_inline_with_cascade() {
        let schema = blog();
        let sql = create_model_table(schema.model("post").unwrap(), Dialect::Sqlite);
        assert!(sql[0].contains(r#"FOREIGN KEY ("user_id") REFERENCES "user" ("id") ON DELETE CASCADE"#));
        assert!(sql[0].contains(r#""id" char(36) NOT NULL PRIMARY KEY"#));
    }

    #[test]
    fn pivot_has_two_foreign_keys_and_composite_key() {
        let schema = blog();
        let sql = create_pivot_table(schema.pivot_table("post_tag").unwrap(), Dialect::Postgres);
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS \"post_tag\" (\n    \
             \"post_id\" character(36) NOT NULL,\n    \
             \"tag_id\" character(36) NOT NULL,\n    \
             FOREIGN KEY (\"post_id\") REFERENCES \"post\" (\"id\") ON DELETE CASCADE,\n    \
             FOREIGN KEY (\"tag_id\") REFERENCES \"tag\" (\"id\") ON DELETE CASCADE,\n    \
             PRIMARY KEY (\"post_id\", \"tag_id\")\n)"
        );
    }

    #[test]
    fn secondary_indexes_are_separate_outside_mysql() {
        let schema = blog();
        let sql = create_model_table(schema.model("user").unwrap(), Dialect::Postgres);
        assert_eq!(sql.len(), 2);
        assert_eq!(
            sql[1],
            r#"CREATE INDEX IF NOT EXISTS "idx_user_score" ON "user" ("score")"#
        );
        assert!(sql[0].contains(r#""id" character(36) NOT NULL DEFAULT gen_random_uuid() PRIMARY KEY"#));
    }

    #[test]
    fn auto_increment_keys_per_dialect() {
        let schema = Schema::builder()
            .model(ModelBuilder::new("Event").increments("id").string("kind", false))
            .build()
            .unwrap();
        let model = schema.model("event").unwrap();
        assert!(create_model_table(model, Dialect::Sqlite)[0].contains(r#""id" integer PRIMARY KEY AUTOINCREMENT"#));
        assert!(create_model_table(model, Dialect::MySql)[0].contains("`id` bigint NOT NULL AUTO_INCREMENT PRIMARY KEY"));
        assert!(create_model_table(model, Dialect::Postgres)[0]
            .contains(r#""id" bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"#));
    }

    #[test]
    fn sqlite_adds_only_what_alter_table_can_express() {
        let schema = blog();
        let user = schema.model("user").unwrap();
        assert!(!sqlite_can_add(user.field("updated_at").unwrap()));
        assert!(!sqlite_can_add(user.field("name").unwrap()));
        assert!(sqlite_can_add(user.field("score").unwrap()));

        let stmts = add_column("user", user.field("score").unwrap(), Dialect::Sqlite, &[]);
        assert_eq!(
            stmts,
            vec![
                r#"ALTER TABLE "user" ADD COLUMN "score" integer NULL DEFAULT 0"#.to_string(),
                r#"CREATE INDEX IF NOT EXISTS "idx_user_score" ON "user" ("score")"#.to_string(),
            ]
        );
    }

    #[test]
    fn mysql_add_column_indexes_through_alter_table() {
        let schema = blog();
        let user = schema.model("user").unwrap();
        let stmts = add_column("user", user.field("name").unwrap(), Dialect::MySql, &[]);
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE `user` ADD COLUMN `name` varchar(255) NOT NULL".to_string(),
                "ALTER TABLE `user` ADD UNIQUE INDEX `uniq_user_name` (`name`)".to_string(),
            ]
        );

        let stmts = add_column("user", user.field("score").unwrap(), Dialect::MySql, &[]);
        assert_eq!(stmts[1], "ALTER TABLE `user` ADD INDEX `idx_user_score` (`score`)");

        let existing = vec!["idx_user_score".to_string()];
        assert_eq!(add_column("user", user.field("score").unwrap(), Dialect::MySql, &existing).len(), 1);
    }

    #[test]
    fn rebuild_copies_shared_columns_with_foreign_keys_off() {
        let schema = blog();
        let existing = vec![
            ColumnInfo {
                name: "id".to_string(),
                data_type: "char(36)".to_string(),
                nullable: false,
                primary_key: true,
            },
            ColumnInfo {
                name: "score".to_string(),
                data_type: "integer".to_string(),
                nullable: true,
                primary_key: false,
            },
            ColumnInfo {
                name: "legacy".to_string(),
                data_type: "text".to_string(),
                nullable: true,
                primary_key: false,
            },
        ];
        let stmts = rebuild_table(schema.model("user").unwrap(), &existing);

        assert_eq!(stmts.first().unwrap(), "PRAGMA foreign_keys = OFF");
        assert_eq!(stmts[1], r#"DROP TABLE IF EXISTS "__new_user""#);
        assert!(stmts[2].starts_with(r#"CREATE TABLE "__new_user" ("#));
        assert!(stmts[2].contains(r#""name" varchar(255) NOT NULL UNIQUE"#));
        assert_eq!(
            stmts[3],
            r#"INSERT INTO "__new_user" ("id", "score") SELECT "id", "score" FROM "user""#
        );
        assert_eq!(stmts[4], r#"DROP TABLE "user""#);
        assert_eq!(stmts[5], r#"ALTER TABLE "__new_user" RENAME TO "user""#);
        assert_eq!(stmts[6], r#"CREATE INDEX IF NOT EXISTS "idx_user_score" ON "user" ("score")"#);
        assert_eq!(stmts.last().unwrap(), "PRAGMA foreign_keys = ON");
    }

    #[test]
    fn type_normalization_ignores_case_and_display_width() {
        assert_eq!(normalize_type("INTEGER"), "integer");
        assert_eq!(normalize_type("int(11)"), "int");
        assert_eq!(normalize_type("decimal(10, 2)"), "decimal(10,2)");
        assert_eq!(normalize_type("tinyint(1)"), "tinyint(1)");
    }

    #[test]
    fn string_defaults_are_escaped() {
        let schema = Schema::builder()
            .model(ModelBuilder::new("Note").id().string("body", false).default("it's"))
            .build()
            .unwrap();
        let sql = create_model_table(schema.model("note").unwrap(), Dialect::Sqlite);
        assert!(sql[0].contains("DEFAULT 'it''s'"));
    }
}
