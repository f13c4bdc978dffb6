//! Relation loading.
//!
//! Loads the rows related to one parent row, one query per relation per
//! parent, then recurses into nested includes on the loaded rows.

use super::registry::RelationRegistry;
use crate::error::QueryError;
use crate::executor::{Executor, Row};
use crate::query::{Condition, Direction, Include, QueryBuilder, RelationOptions};
use crate::schema::{RelationKind, RelationSpec};

/// Rows produced by one relation load.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// BelongsTo and HasOne: zero or one row
    One(Option<Row>),
    /// HasMany and BelongsToMany: always a list, possibly empty
    Many(Vec<Row>),
}

impl Loaded {
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Loaded::One(Some(row)) => serde_json::Value::Object(row),
            Loaded::One(None) => serde_json::Value::Null,
            Loaded::Many(rows) => serde_json::Value::Array(rows.into_iter().map(serde_json::Value::Object).collect()),
        }
    }

    fn rows_mut(&mut self) -> &mut [Row] {
        match self {
            Loaded::One(Some(row)) => std::slice::from_mut(row),
            Loaded::One(None) => &mut [],
            Loaded::Many(rows) => rows.as_mut_slice(),
        }
    }
}

/// Loads relations against one executor using a shared registry.
pub struct RelationLoader<'a> {
    executor: &'a dyn Executor,
    registry: &'a RelationRegistry,
}

impl<'a> RelationLoader<'a> {
    pub fn new(executor: &'a dyn Executor, registry: &'a RelationRegistry) -> Self {
        RelationLoader { executor, registry }
    }

    /// Load one relation of `parent`, a row of `table`, including its nested includes.
    pub fn load(
        &self,
        table: &str,
        parent: &Row,
        relation: &str,
        options: &RelationOptions,
    ) -> Result<Loaded, QueryError> {
        let spec = self.registry.get(table, relation)?;
        let mut loaded = self.load_direct(table, parent, spec, options)?;
        if !options.include.is_empty() {
            self.attach(&spec.target, loaded.rows_mut(), &options.include)?;
        }
        Ok(loaded)
    }

    /// Load every requested relation for each row and store it under the
    /// relation's result key.
    pub fn attach(&self, table: &str, rows: &mut [Row], include: &Include) -> Result<(), QueryError> {
        if include.is_empty() {
            return Ok(());
        }
        for (name, _) in include.iter() {
            self.registry.get(table, name)?;
        }
        for row in rows.iter_mut() {
            for (name, options) in include.iter() {
                let key = self.registry.get(table, name)?.result_key();
                let loaded = self.load(table, row, name, options)?;
                row.insert(key, loaded.into_json());
            }
        }
        Ok(())
    }

    fn load_direct(
        &self,
        table: &str,
        parent: &Row,
        spec: &RelationSpec,
        options: &RelationOptions,
    ) -> Result<Loaded, QueryError> {
        match &spec.kind {
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
                ..
            } => {
                let Some(key) = key_value(parent, foreign_key) else {
                    return Ok(Loaded::One(None));
                };
                let builder = QueryBuilder::table(&spec.target).condition(Condition::new().eq(owner_key, key));
                let rows = self.fetch(apply_options(builder, options).take(1))?;
                Ok(Loaded::One(rows.into_iter().next()))
            }
            RelationKind::HasOne {
                foreign_key,
                local_key,
            } => {
                let Some(key) = key_value(parent, local_key) else {
                    return Ok(Loaded::One(None));
                };
                let mut builder = apply_options(
                    QueryBuilder::table(&spec.target).condition(Condition::new().eq(foreign_key, key)),
                    options,
                );
                if options.order_by.is_empty() {
                    builder = builder.order_by(self.registry.primary_key(&spec.target)?, Direction::Asc);
                }
                let rows = self.fetch(builder.take(1))?;
                Ok(Loaded::One(rows.into_iter().next()))
            }
            RelationKind::HasMany {
                foreign_key,
                local_key,
            } => {
                let Some(key) = key_value(parent, local_key) else {
                    return Ok(Loaded::Many(Vec::new()));
                };
                let builder = QueryBuilder::table(&spec.target).condition(Condition::new().eq(foreign_key, key));
                Ok(Loaded::Many(self.fetch(apply_options(builder, options))?))
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
            } => {
                let parent_key = self.registry.primary_key(table)?;
                let Some(key) = key_value(parent, parent_key) else {
                    return Ok(Loaded::Many(Vec::new()));
                };
                let target_key = self.registry.primary_key(&spec.target)?;
                let builder = QueryBuilder::table(&spec.target)
                    .inner_join(pivot_table, related_pivot_key, target_key)
                    .scope(pivot_table, foreign_pivot_key, key);
                Ok(Loaded::Many(self.fetch(apply_options(builder, options))?))
            }
        }
    }

    fn fetch(&self, builder: QueryBuilder) -> Result<Vec<Row>, QueryError> {
        builder
            .build_select(self.executor.dialect())
            .fetch_all(self.executor)
    }
}

fn key_value(row: &Row, column: &str) -> Option<serde_json::Value> {
    row.get(column).filter(|v| !v.is_null()).cloned()
}

fn apply_options(mut builder: QueryBuilder, options: &RelationOptions) -> QueryBuilder {
    if let Some(columns) = &options.select {
        builder = builder.select(columns.iter().cloned());
    }
    builder = builder.condition(options.filter.clone()).order_by_spec(&options.order_by);
    if let Some(take) = options.take {
        builder = builder.take(take);
    }
    if let Some(skip) = options.skip {
        builder = builder.skip(skip);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelBuilder, Schema};
    use crate::test_support::{row, MockExecutor};
    use serde_json::json;

    fn registry() -> RelationRegistry {
        let schema = Schema::builder()
            .model(
                ModelBuilder::new("User")
                    .id()
                    .string("name", false)
                    .has_many("Post")
                    .has_one("Profile"),
            )
            .model(
                ModelBuilder::new("Post")
                    .id()
                    .string("title", false)
                    .belongs_to("User")
                    .nullable(true)
                    .belongs_to_many("Tag"),
            )
            .model(ModelBuilder::new("Profile").id().string("bio", true).belongs_to("User"))
            .model(ModelBuilder::new("Tag").id().string("label", false))
            .build()
            .unwrap();
        RelationRegistry::from_schema(&schema)
    }

    #[test]
    fn belongs_to_with_null_key_is_absent_without_query() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);

        let post = row(json!({"id": "p1", "user_id": null}));
        let loaded = loader.load("post", &post, "user", &RelationOptions::default()).unwrap();
        assert_eq!(loaded, Loaded::One(None));
        assert!(executor.statements().is_empty());
    }

    #[test]
    fn has_many_without_children_is_empty_list() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);

        let user = row(json!({"id": "u1"}));
        let loaded = loader.load("user", &user, "posts", &RelationOptions::default()).unwrap();
        assert_eq!(loaded.into_json(), json!([]));
        assert_eq!(
            executor.statements(),
            vec![r#"SELECT * FROM "post" WHERE "user_id" = ?"#.to_string()]
        );
    }

    #[test]
    fn has_one_orders_by_primary_key_by_default() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);

        loader
            .load("user", &row(json!({"id": "u1"})), "profile", &RelationOptions::default())
            .unwrap();
        assert_eq!(
            executor.statements()[0],
            r#"SELECT * FROM "profile" WHERE "user_id" = ? ORDER BY "id" ASC LIMIT ?"#
        );
    }

    #[test]
    fn belongs_to_many_joins_pivot_and_applies_options() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);
        executor.push_rows(vec![row(json!({"id": "t1", "label": "rust"}))]);

        let options = RelationOptions::new()
            .filter(Condition::parse(&json!({"label": ["!=", "go"]})).unwrap())
            .order_by("label", Direction::Desc)
            .take(2);
        let loaded = loader.load("post", &row(json!({"id": "p1"})), "tags", &options).unwrap();

        assert_eq!(loaded, Loaded::Many(vec![row(json!({"id": "t1", "label": "rust"}))]));
        assert_eq!(
            executor.statements()[0],
            concat!(
                r#"SELECT "tag".* FROM "tag" INNER JOIN "post_tag" ON "post_tag"."tag_id" = "tag"."id" "#,
                r#"WHERE "post_tag"."post_id" = ? AND "tag"."label" <> ? ORDER BY "tag"."label" DESC LIMIT ?"#
            )
        );
    }

    #[test]
    fn nested_includes_attach_under_result_keys() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);
        executor.push_rows(vec![row(json!({"id": "p1", "user_id": "u1"}))]);
        executor.push_rows(vec![row(json!({"id": "t1"})), row(json!({"id": "t2"}))]);

        let mut users = vec![row(json!({"id": "u1"}))];
        let include = Include::new().with("posts", RelationOptions::new().include(Include::new().relation("tags")));
        loader.attach("user", &mut users, &include).unwrap();

        assert_eq!(
            serde_json::Value::Object(users.remove(0)),
            json!({"id": "u1", "posts": [{"id": "p1", "user_id": "u1", "tags": [{"id": "t1"}, {"id": "t2"}]}]})
        );
    }

    #[test]
    fn unknown_include_fails_before_querying() {
        let registry = registry();
        let executor = MockExecutor::new();
        let loader = RelationLoader::new(&executor, &registry);
        let mut users = vec![row(json!({"id": "u1"}))];
        let include = Include::new().relation("posts").relation("followers");

        let err = loader.attach("user", &mut users, &include).unwrap_err();
        assert!(matches!(err, QueryError::UnknownRelation { .. }));
        assert!(executor.statements().is_empty());
    }
}
