//! Schema files.
//!
//! A TOML description of models, replayed through [`ModelBuilder`] so a file
//! is validated exactly like a schema declared in code:
//!
//! ```toml
//! [[model]]
//! name = "User"
//! fields = [
//!     { name = "id", type = "id" },
//!     { name = "email", type = "string", unique = true },
//!     { name = "updated_at", type = "datetime" },
//! ]
//! relations = [{ kind = "has_many", target = "Post" }]
//! ```

use super::builder::ModelBuilder;
use super::error::SchemaError;
use super::field::{DefaultValue, FieldSpec, FieldType};
use super::model::{ModelDefinition, Schema};
use super::relation::{ReferentialAction, RelationKind, RelationSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    #[serde(default)]
    model: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ModelEntry {
    name: String,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    relations: Vec<RelationEntry>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default, skip_serializing_if = "is_false")]
    nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    index: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    primary: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    on_update_current_timestamp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum RelationEntryKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RelationEntry {
    kind: RelationEntryKind,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pivot_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_pivot_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    related_pivot_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_delete: Option<ReferentialAction>,
}

/// Parse a schema from TOML text.
pub fn parse_schema(source: &str) -> Result<Schema, SchemaError> {
    let file: SchemaFile = toml::from_str(source).map_err(|e| SchemaError::File(e.to_string()))?;
    let mut builder = Schema::builder();
    for entry in file.model {
        builder = builder.model(model_from_entry(entry)?);
    }
    builder.build()
}

/// Read and parse a schema file.
pub fn load_schema(path: &Path) -> Result<Schema, SchemaError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::File(format!("{}: {}", path.display(), e)))?;
    parse_schema(&source)
}

/// Render a schema in the file format; parsing the text yields an equal schema.
pub fn to_toml(schema: &Schema) -> Result<String, SchemaError> {
    let file = SchemaFile {
        model: schema.models().iter().map(model_entry).collect(),
    };
    toml::to_string(&file).map_err(|e| SchemaError::File(e.to_string()))
}

fn model_entry(model: &ModelDefinition) -> ModelEntry {
    ModelEntry {
        name: model.name.clone(),
        fields: model.fields.iter().map(field_entry).collect(),
        relations: model.relations.iter().map(relation_entry).collect(),
    }
}

fn field_entry(field: &FieldSpec) -> FieldEntry {
    let is_uuid_key = field.ty == FieldType::Identifier
        && field.is_primary_key()
        && field.default_value() == Some(&DefaultValue::Uuid);
    let ty = match field.ty {
        _ if is_uuid_key => "id",
        _ if field.is_auto_increment() => "increments",
        FieldType::Identifier => "foreign_id",
        FieldType::String => "string",
        FieldType::Text => "text",
        FieldType::Integer => "integer",
        FieldType::BigInteger => "big_integer",
        FieldType::Float => "float",
        FieldType::Decimal => "decimal",
        FieldType::Boolean => "boolean",
        FieldType::DateTime => "datetime",
        FieldType::Date => "date",
        FieldType::Time => "time",
        FieldType::Json => "json",
    };
    let implied_key = is_uuid_key || field.is_auto_increment();
    let default = match field.default_value() {
        Some(DefaultValue::Uuid) if is_uuid_key => None,
        Some(DefaultValue::Uuid) => Some(serde_json::Value::String("uuid()".to_string())),
        Some(DefaultValue::CurrentTimestamp) => Some(serde_json::Value::String("now()".to_string())),
        Some(DefaultValue::Value(serde_json::Value::Null)) | None => None,
        Some(DefaultValue::Value(v)) => Some(v.clone()),
    };
    FieldEntry {
        name: field.name.clone(),
        ty: ty.to_string(),
        nullable: field.nullable,
        unique: field.is_unique(),
        index: field.is_indexed(),
        primary: field.is_primary_key() && !implied_key,
        on_update_current_timestamp: field.auto_updates(),
        default,
    }
}

fn relation_entry(relation: &RelationSpec) -> RelationEntry {
    let mut entry = RelationEntry {
        kind: RelationEntryKind::BelongsTo,
        target: relation.target.clone(),
        name: Some(relation.name.clone()),
        foreign_key: None,
        local_key: None,
        owner_key: None,
        pivot_table: None,
        foreign_pivot_key: None,
        related_pivot_key: None,
        nullable: None,
        on_delete: None,
    };
    match &relation.kind {
        RelationKind::BelongsTo {
            foreign_key,
            owner_key,
            on_delete,
        } => {
            entry.foreign_key = Some(foreign_key.clone());
            entry.owner_key = Some(owner_key.clone());
            entry.on_delete = *on_delete;
        }
        RelationKind::HasOne { foreign_key, local_key } | RelationKind::HasMany { foreign_key, local_key } => {
            entry.kind = if matches!(relation.kind, RelationKind::HasOne { .. }) {
                RelationEntryKind::HasOne
            } else {
                RelationEntryKind::HasMany
            };
            entry.foreign_key = Some(foreign_key.clone());
            entry.local_key = Some(local_key.clone());
        }
        RelationKind::BelongsToMany {
            pivot_table,
            foreign_pivot_key,
            related_pivot_key,
        } => {
            entry.kind = RelationEntryKind::BelongsToMany;
            entry.pivot_table = Some(pivot_table.clone());
            entry.foreign_pivot_key = Some(foreign_pivot_key.clone());
            entry.related_pivot_key = Some(related_pivot_key.clone());
        }
    }
    entry
}

fn model_from_entry(entry: ModelEntry) -> Result<ModelBuilder, SchemaError> {
    let mut model = ModelBuilder::new(entry.name.clone());

    for field in entry.fields {
        let name = field.name.as_str();
        model = match field.ty.as_str() {
            "id" | "uuid" => model.id_named(name),
            "increments" => model.increments(name),
            "string" => model.string(name, field.nullable),
            "text" => model.text(name, field.nullable),
            "integer" | "int" => model.integer(name, field.nullable),
            "big_integer" | "bigint" => model.big_integer(name, field.nullable),
            "float" | "double" => model.float(name, field.nullable),
            "decimal" => model.decimal(name, field.nullable),
            "boolean" | "bool" => model.boolean(name, field.nullable),
            "datetime" | "timestamp" => model.datetime(name, field.nullable),
            "date" => model.date(name, field.nullable),
            "time" => model.time(name, field.nullable),
            "json" => model.json(name, field.nullable),
            "foreign_id" => model.foreign_id(name).nullable(field.nullable),
            other => {
                return Err(SchemaError::InvalidAttribute {
                    model: entry.name,
                    field: field.name.clone(),
                    reason: format!("unknown field type '{}'", other),
                })
            }
        };
        if field.primary {
            model = model.primary_key();
        }
        if field.unique {
            model = model.unique();
        }
        if field.index {
            model = model.index();
        }
        if field.on_update_current_timestamp {
            model = model.on_update_current_timestamp();
        }
        if let Some(default) = field.default {
            model = match default {
                serde_json::Value::String(s) => model.default(s),
                other => model.default(super::field::DefaultValue::Value(other)),
            };
        }
    }

    for relation in entry.relations {
        let target = relation.target.as_str();
        model = match relation.kind {
            RelationEntryKind::BelongsTo => {
                let fk = relation
                    .foreign_key
                    .unwrap_or_else(|| crate::naming::foreign_key_for(target));
                let owner = relation.owner_key.unwrap_or_else(|| "id".to_string());
                let mut m = model.belongs_to_keyed(target, &fk, &owner);
                if let Some(nullable) = relation.nullable {
                    m = m.nullable(nullable);
                }
                if let Some(action) = relation.on_delete {
                    m = m.on_delete(action);
                }
                m
            }
            RelationEntryKind::HasOne | RelationEntryKind::HasMany => {
                let fk = relation
                    .foreign_key
                    .unwrap_or_else(|| crate::naming::foreign_key_for(&entry.name));
                let local = relation.local_key.unwrap_or_else(|| "id".to_string());
                if matches!(relation.kind, RelationEntryKind::HasOne) {
                    model.has_one_keyed(target, &fk, &local)
                } else {
                    model.has_many_keyed(target, &fk, &local)
                }
            }
            RelationEntryKind::BelongsToMany => {
                let pivot = relation
                    .pivot_table
                    .unwrap_or_else(|| crate::naming::pivot_table_for(&entry.name, target));
                let fpk = relation
                    .foreign_pivot_key
                    .unwrap_or_else(|| crate::naming::foreign_key_for(&entry.name));
                let rpk = relation
                    .related_pivot_key
                    .unwrap_or_else(|| crate::naming::foreign_key_for(target));
                model.belongs_to_many_via(target, &pivot, &fpk, &rpk)
            }
        };
        if let Some(name) = relation.name {
            model = model.named(&name);
        }
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, RelationKind};

    const BLOG: &str = r#"
[[model]]
name = "User"
fields = [
    { name = "id", type = "id" },
    { name = "name", type = "string", unique = true },
    { name = "score", type = "integer", default = 0 },
]
relations = [{ kind = "has_many", target = "Post" }]

[[model]]
name = "Post"
fields = [
    { name = "id", type = "id" },
    { name = "title", type = "string" },
    { name = "published_at", type = "datetime", nullable = true },
]
relations = [
    { kind = "belongs_to", target = "User", nullable = true, on_delete = "cascade" },
    { kind = "belongs_to_many", target = "Tag", name = "labels" },
]

[[model]]
name = "Tag"
fields = [{ name = "id", type = "id" }, { name = "label", type = "string" }]
"#;

    #[test]
    fn parses_models_fields_and_relations() {
        let schema = parse_schema(BLOG).unwrap();
        assert_eq!(schema.models().len(), 3);

        let user = schema.model("user").unwrap();
        assert!(user.field("name").unwrap().is_unique());
        assert_eq!(user.field("score").unwrap().ty, FieldType::Integer);

        let post = schema.model("post").unwrap();
        assert!(post.field("user_id").unwrap().nullable);
        assert!(matches!(
            post.relation("labels").unwrap().kind,
            RelationKind::BelongsToMany { ref pivot_table, .. } if pivot_table == "post_tag"
        ));
    }

    #[test]
    fn unknown_types_and_keys_are_errors() {
        let err = parse_schema("[[model]]\nname = \"A\"\nfields = [{ name = \"id\", type = \"blob\" }]")
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAttribute { .. }));

        let err = parse_schema("[[model]]\nname = \"A\"\ncolour = \"red\"").unwrap_err();
        assert!(matches!(err, SchemaError::File(_)));
    }

    #[test]
    fn rendered_toml_parses_back_to_the_same_schema() {
        let schema = parse_schema(BLOG).unwrap();
        let rendered = to_toml(&schema).unwrap();
        assert_eq!(parse_schema(&rendered).unwrap(), schema);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.toml");
        std::fs::write(&path, BLOG).unwrap();
        assert_eq!(load_schema(&path).unwrap().models().len(), 3);
        assert!(load_schema(&dir.path().join("missing.toml")).is_err());
    }
}
