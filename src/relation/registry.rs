//! Read-only index of relations keyed by owning table.

use crate::error::QueryError;
use crate::naming;
use crate::schema::{RelationSpec, Schema};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct TableEntry {
    primary_key: String,
    relations: Vec<RelationSpec>,
}

/// Relations of every model, looked up by normalized table name.
///
/// Built once from a [`Schema`] and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    tables: HashMap<String, TableEntry>,
}

impl RelationRegistry {
    pub fn from_schema(schema: &Schema) -> Self {
        let tables = schema
            .models()
            .iter()
            .map(|model| {
                (
                    model.table.clone(),
                    TableEntry {
                        primary_key: model.primary_key().name.clone(),
                        relations: model.relations.clone(),
                    },
                )
            })
            .collect();
        RelationRegistry { tables }
    }

    fn entry(&self, table: &str) -> Result<&TableEntry, QueryError> {
        self.tables
            .get(&naming::normalize(table))
            .ok_or_else(|| QueryError::UnknownModel(table.to_string()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(&naming::normalize(table))
    }

    /// Primary key column of a table.
    pub fn primary_key(&self, table: &str) -> Result<&str, QueryError> {
        Ok(self.entry(table)?.primary_key.as_str())
    }

    /// Relations declared on a table, in declaration order.
    pub fn relations_of(&self, table: &str) -> Result<&[RelationSpec], QueryError> {
        Ok(&self.entry(table)?.relations)
    }

    /// Resolve a relation by name. Plural result keys resolve too (`posts` finds `post`).
    pub fn get(&self, table: &str, relation: &str) -> Result<&RelationSpec, QueryError> {
        let wanted = naming::normalize(relation);
        self.relations_of(table)?
            .iter()
            .find(|r| r.name == wanted)
            .ok_or_else(|| QueryError::UnknownRelation {
                model: naming::normalize(table),
                relation: relation.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelBuilder, RelationKind};

    fn schema() -> Schema {
        Schema::builder()
            .model(ModelBuilder::new("User").id().string("name", false).has_many("Post"))
            .model(ModelBuilder::new("Post").id().string("title", false).belongs_to("User"))
            .build()
            .unwrap()
    }

    #[test]
    fn lookups_are_normalized() {
        let registry = RelationRegistry::from_schema(&schema());
        assert!(registry.contains("Users"));
        assert_eq!(registry.primary_key("posts").unwrap(), "id");

        let posts = registry.get("user", "posts").unwrap();
        assert_eq!(posts.target, "post");
        assert!(matches!(posts.kind, RelationKind::HasMany { .. }));
        assert_eq!(posts.result_key(), "posts");
    }

    #[test]
    fn unknown_names_are_errors() {
        let registry = RelationRegistry::from_schema(&schema());
        assert!(matches!(
            registry.get("user", "comments"),
            Err(QueryError::UnknownRelation { .. })
        ));
        assert!(matches!(registry.relations_of("comment"), Err(QueryError::UnknownModel(_))));
    }
}
