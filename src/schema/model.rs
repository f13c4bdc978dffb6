//! Immutable schema values produced by the builders.

use super::field::{FieldSpec, FieldType};
use super::relation::{RelationKind, RelationSpec};
use crate::naming;

/// One model: its table, ordered fields and declared relations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    /// Name as declared
    pub name: String,
    /// Normalized table name
    pub table: String,
    pub fields: Vec<FieldSpec>,
    pub relations: Vec<RelationSpec>,
    pub(crate) primary_key: usize,
}

impl ModelDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The primary key field. Validated models always have exactly one.
    pub fn primary_key(&self) -> &FieldSpec {
        &self.fields[self.primary_key]
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        let wanted = naming::normalize(name);
        self.relations.iter().find(|r| r.name == wanted)
    }

    /// Tables this model's foreign keys point at, excluding itself.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for relation in &self.relations {
            if let RelationKind::BelongsTo { .. } = relation.kind {
                if relation.target != self.table && !deps.contains(&relation.target) {
                    deps.push(relation.target.clone());
                }
            }
        }
        deps
    }
}

/// One side of a pivot table: the key column and the model it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotKey {
    pub column: String,
    pub table: String,
    pub references: String,
    pub ty: FieldType,
}

/// Join table backing a BelongsToMany relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub name: String,
    pub keys: [PivotKey; 2],
}

/// A validated set of models. Lookups are by normalized name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub(crate) models: Vec<ModelDefinition>,
    pub(crate) pivots: Vec<PivotTable>,
}

impl Schema {
    /// Models in declaration order
    pub fn models(&self) -> &[ModelDefinition] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        let wanted = naming::normalize(name);
        self.models.iter().find(|m| m.table == wanted)
    }

    /// Pivot tables, each listed once, in first-declaration order
    pub fn pivot_tables(&self) -> &[PivotTable] {
        &self.pivots
    }

    pub fn pivot_table(&self, name: &str) -> Option<&PivotTable> {
        self.pivots.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
