//! Fluent builders for models and schemas.
//!
//! Field modifiers (`unique`, `index`, `default`, `nullable`, `primary_key`)
//! apply to the most recently declared field; relation modifiers (`named`,
//! `on_delete`) apply to the most recently declared relation. Misuse is
//! recorded and reported by `build`, so a chain never panics halfway.

use super::error::SchemaError;
use super::field::{DefaultValue, FieldAttribute, FieldSpec, FieldType};
use super::model::{ModelDefinition, PivotKey, PivotTable, Schema};
use super::relation::{ReferentialAction, RelationKind, RelationSpec};
use crate::naming;

/// Builder for one [`ModelDefinition`].
///
/// # Example
///
/// ```
/// use keel::schema::{ModelBuilder, Schema};
///
/// let schema = Schema::builder()
///     .model(ModelBuilder::new("Role").id().string("name", false).unique())
///     .model(
///         ModelBuilder::new("User")
///             .id()
///             .string("email", false).unique()
///             .belongs_to("Role")
///             .datetime("updated_at", false),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(schema.model("users").unwrap().field("role_id").unwrap().nullable, false);
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    relations: Vec<RelationSpec>,
    last_field: Option<usize>,
    last_relation: Option<usize>,
    errors: Vec<SchemaError>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            last_field: None,
            last_relation: None,
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// UUID primary key named `id`, generated by the store when omitted.
    pub fn id(self) -> Self {
        self.id_named("id")
    }

    pub fn id_named(self, name: &str) -> Self {
        self.field(name, FieldType::Identifier, false)
            .with_attribute(FieldAttribute::PrimaryKey)
            .with_attribute(FieldAttribute::Default(DefaultValue::Uuid))
    }

    /// Store-assigned integer primary key.
    pub fn increments(self, name: &str) -> Self {
        self.field(name, FieldType::BigInteger, false)
            .with_attribute(FieldAttribute::PrimaryKey)
            .with_attribute(FieldAttribute::AutoIncrement)
    }

    pub fn string(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::String, nullable)
    }

    pub fn text(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Text, nullable)
    }

    pub fn integer(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Integer, nullable)
    }

    pub fn big_integer(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::BigInteger, nullable)
    }

    pub fn float(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Float, nullable)
    }

    pub fn decimal(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Decimal, nullable)
    }

    pub fn boolean(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Boolean, nullable)
    }

    /// Timestamp column. A column named `updated_at` defaults to the current
    /// time and is refreshed on every update.
    pub fn datetime(self, name: &str, nullable: bool) -> Self {
        let builder = self.field(name, FieldType::DateTime, nullable);
        if name == "updated_at" {
            builder
                .with_attribute(FieldAttribute::Default(DefaultValue::CurrentTimestamp))
                .with_attribute(FieldAttribute::OnUpdateCurrentTimestamp)
        } else {
            builder
        }
    }

    pub fn date(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Date, nullable)
    }

    pub fn time(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Time, nullable)
    }

    pub fn json(self, name: &str, nullable: bool) -> Self {
        self.field(name, FieldType::Json, nullable)
    }

    /// Non-null identifier column referencing another model's UUID key.
    pub fn foreign_id(self, name: &str) -> Self {
        self.field(name, FieldType::Identifier, false)
    }

    pub fn unique(self) -> Self {
        self.with_attribute(FieldAttribute::Unique)
    }

    pub fn index(self) -> Self {
        self.with_attribute(FieldAttribute::Index)
    }

    pub fn primary_key(self) -> Self {
        self.with_attribute(FieldAttribute::PrimaryKey)
    }

    pub fn on_update_current_timestamp(self) -> Self {
        self.with_attribute(FieldAttribute::OnUpdateCurrentTimestamp)
    }

    /// Default value; `"now()"` and `"CURRENT_TIMESTAMP"` mean the current time.
    pub fn default(self, value: impl Into<DefaultValue>) -> Self {
        self.with_attribute(FieldAttribute::Default(value.into()))
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        match self.last_field {
            Some(idx) => self.fields[idx].nullable = nullable,
            None => self.misuse("nullable() must follow a field declaration"),
        }
        self
    }

    /// The target holds `{model}_id` referencing this model's `id`; at most one row.
    pub fn has_one(self, target: &str) -> Self {
        let foreign_key = naming::foreign_key_for(&self.name);
        self.has_one_keyed(target, &foreign_key, "id")
    }

    pub fn has_one_keyed(self, target: &str, foreign_key: &str, local_key: &str) -> Self {
        self.relation(
            target,
            RelationKind::HasOne {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        )
    }

    /// The target holds `{model}_id` referencing this model's `id`.
    pub fn has_many(self, target: &str) -> Self {
        let foreign_key = naming::foreign_key_for(&self.name);
        self.has_many_keyed(target, &foreign_key, "id")
    }

    pub fn has_many_keyed(self, target: &str, foreign_key: &str, local_key: &str) -> Self {
        self.relation(
            target,
            RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        )
    }

    /// This model holds `{target}_id` referencing the target's `id`. The
    /// foreign key field is declared (non-null) unless it already exists;
    /// a following `nullable(true)` relaxes it.
    pub fn belongs_to(self, target: &str) -> Self {
        let foreign_key = naming::foreign_key_for(target);
        self.belongs_to_keyed(target, &foreign_key, "id")
    }

    pub fn belongs_to_keyed(self, target: &str, foreign_key: &str, owner_key: &str) -> Self {
        let mut builder = match self.fields.iter().position(|f| f.name == foreign_key) {
            Some(idx) => {
                let mut builder = self;
                builder.last_field = Some(idx);
                builder
            }
            None => self.foreign_id(foreign_key),
        };
        let field = builder.last_field;
        builder = builder.relation(
            target,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
                owner_key: owner_key.to_string(),
                on_delete: None,
            },
        );
        builder.last_field = field;
        builder
    }

    /// Many-to-many through the pivot `{a}_{b}` (names sorted) holding
    /// `{model}_id` and `{target}_id`.
    pub fn belongs_to_many(self, target: &str) -> Self {
        let pivot = naming::pivot_table_for(&self.name, target);
        let foreign_pivot_key = naming::foreign_key_for(&self.name);
        let related_pivot_key = naming::foreign_key_for(target);
        self.belongs_to_many_via(target, &pivot, &foreign_pivot_key, &related_pivot_key)
    }

    pub fn belongs_to_many_via(
        self,
        target: &str,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> Self {
        self.relation(
            target,
            RelationKind::BelongsToMany {
                pivot_table: pivot_table.to_string(),
                foreign_pivot_key: foreign_pivot_key.to_string(),
                related_pivot_key: related_pivot_key.to_string(),
            },
        )
    }

    /// Rename the most recent relation (defaults to the target name).
    pub fn named(mut self, name: &str) -> Self {
        match self.last_relation {
            Some(idx) => self.relations[idx].name = naming::normalize(name),
            None => self.misuse("named() must follow a relation declaration"),
        }
        self
    }

    /// Referential action for the most recent BelongsTo relation.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        match self.last_relation.map(|idx| &mut self.relations[idx].kind) {
            Some(RelationKind::BelongsTo { on_delete, .. }) => *on_delete = Some(action),
            _ => self.misuse("on_delete() must follow a belongs_to declaration"),
        }
        self
    }

    /// Validate and freeze the model.
    pub fn build(self) -> Result<ModelDefinition, SchemaError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let table = naming::normalize(&self.name);
        if table.is_empty() {
            return Err(SchemaError::InvalidDefinition {
                model: self.name,
                reason: "model name cannot be empty".to_string(),
            });
        }

        let keys: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_primary_key())
            .map(|(idx, _)| idx)
            .collect();
        let primary_key = match keys.as_slice() {
            [idx] => *idx,
            [] => return Err(SchemaError::MissingPrimaryKey(self.name)),
            _ => return Err(SchemaError::MultiplePrimaryKeys { model: self.name }),
        };

        for field in &self.fields {
            if let Some(reason) = field.attribute_problem() {
                return Err(SchemaError::InvalidAttribute {
                    model: self.name.clone(),
                    field: field.name.clone(),
                    reason,
                });
            }
        }

        for (idx, relation) in self.relations.iter().enumerate() {
            if self.relations[..idx].iter().any(|r| r.name == relation.name) {
                return Err(SchemaError::DuplicateRelation {
                    model: self.name.clone(),
                    relation: relation.name.clone(),
                });
            }
        }

        Ok(ModelDefinition {
            name: self.name,
            table,
            fields: self.fields,
            relations: self.relations,
            primary_key,
        })
    }

    fn field(mut self, name: &str, ty: FieldType, nullable: bool) -> Self {
        if self.fields.iter().any(|f| f.name == name) {
            self.errors.push(SchemaError::DuplicateField {
                model: self.name.clone(),
                field: name.to_string(),
            });
            return self;
        }
        self.fields.push(FieldSpec::new(name, ty, nullable));
        self.last_field = Some(self.fields.len() - 1);
        self
    }

    fn with_attribute(mut self, attribute: FieldAttribute) -> Self {
        match self.last_field {
            Some(idx) => self.fields[idx].push_attribute(attribute),
            None => self.misuse("field modifiers must follow a field declaration"),
        }
        self
    }

    fn relation(mut self, target: &str, kind: RelationKind) -> Self {
        let target = naming::normalize(target);
        self.relations.push(RelationSpec {
            name: target.clone(),
            target,
            kind,
        });
        self.last_relation = Some(self.relations.len() - 1);
        self.last_field = None;
        self
    }

    fn misuse(&mut self, reason: &str) {
        self.errors.push(SchemaError::InvalidDefinition {
            model: self.name.clone(),
            reason: reason.to_string(),
        });
    }
}

/// Collects models and validates them as a whole.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelBuilder>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }
}

impl SchemaBuilder {
    pub fn model(mut self, model: ModelBuilder) -> Self {
        self.models.push(model);
        self
    }

    /// Build every model, then check cross-model references:
    /// relation targets exist, key fields exist with compatible types, and
    /// pivot tables are declared consistently by both sides.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut models: Vec<ModelDefinition> = Vec::with_capacity(self.models.len());
        for builder in self.models {
            let model = builder.build()?;
            if models.iter().any(|m| m.table == model.table) {
                return Err(SchemaError::DuplicateModel(model.name));
            }
            models.push(model);
        }

        let mut pivots: Vec<PivotTable> = Vec::new();
        for model in &models {
            for relation in &model.relations {
                let target = models
                    .iter()
                    .find(|m| m.table == relation.target)
                    .ok_or_else(|| SchemaError::UnknownModel {
                        model: model.name.clone(),
                        relation: relation.name.clone(),
                        target: relation.target.clone(),
                    })?;

                match &relation.kind {
                    RelationKind::BelongsTo {
                        foreign_key,
                        owner_key,
                        ..
                    } => check_key_pair(model, relation, model, foreign_key, target, owner_key)?,
                    RelationKind::HasOne {
                        foreign_key,
                        local_key,
                    }
                    | RelationKind::HasMany {
                        foreign_key,
                        local_key,
                    } => check_key_pair(model, relation, target, foreign_key, model, local_key)?,
                    RelationKind::BelongsToMany {
                        pivot_table,
                        foreign_pivot_key,
                        related_pivot_key,
                    } => {
                        let pivot = pivot_for(model, target, pivot_table, foreign_pivot_key, related_pivot_key)?;
                        if models.iter().any(|m| m.table == pivot.name) {
                            return Err(SchemaError::PivotConflict {
                                pivot: pivot.name,
                                reason: "name collides with a model table".to_string(),
                            });
                        }
                        merge_pivot(&mut pivots, pivot)?;
                    }
                }
            }
        }

        Ok(Schema { models, pivots })
    }
}

/// `holder.foreign_key` must exist and be able to reference `referenced.key`.
fn check_key_pair(
    model: &ModelDefinition,
    relation: &RelationSpec,
    holder: &ModelDefinition,
    foreign_key: &str,
    referenced: &ModelDefinition,
    key: &str,
) -> Result<(), SchemaError> {
    let missing = |on: &ModelDefinition, field: &str| SchemaError::MissingKey {
        model: model.name.clone(),
        relation: relation.name.clone(),
        holder: on.name.clone(),
        field: field.to_string(),
    };
    let fk = holder.field(foreign_key).ok_or_else(|| missing(holder, foreign_key))?;
    let referenced_key = referenced.field(key).ok_or_else(|| missing(referenced, key))?;
    if !fk.ty.references(referenced_key.ty) {
        return Err(SchemaError::ForeignKeyTypeMismatch {
            model: holder.name.clone(),
            field: fk.name.clone(),
            expected: referenced_key.ty,
            found: fk.ty,
        });
    }
    Ok(())
}

fn pivot_for(
    model: &ModelDefinition,
    target: &ModelDefinition,
    pivot_table: &str,
    foreign_pivot_key: &str,
    related_pivot_key: &str,
) -> Result<PivotTable, SchemaError> {
    if foreign_pivot_key == related_pivot_key {
        return Err(SchemaError::PivotConflict {
            pivot: pivot_table.to_string(),
            reason: format!("both keys are named '{}'", foreign_pivot_key),
        });
    }
    let side = |column: &str, m: &ModelDefinition| PivotKey {
        column: column.to_string(),
        table: m.table.clone(),
        references: m.primary_key().name.clone(),
        ty: m.primary_key().ty,
    };
    Ok(PivotTable {
        name: pivot_table.to_string(),
        keys: [side(foreign_pivot_key, model), side(related_pivot_key, target)],
    })
}

fn merge_pivot(pivots: &mut Vec<PivotTable>, pivot: PivotTable) -> Result<(), SchemaError> {
    match pivots.iter().find(|p| p.name == pivot.name) {
        None => {
            pivots.push(pivot);
            Ok(())
        }
        Some(existing) => {
            let same = pivot.keys.iter().all(|k| existing.keys.contains(k));
            if same {
                Ok(())
            } else {
                Err(SchemaError::PivotConflict {
                    pivot: pivot.name,
                    reason: "the two sides declare different key columns".to_string(),
                })
            }
        }
    }
}
