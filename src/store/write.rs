//! Writes: `create`, `create_many`, `update`, `delete`, and the nested
//! relation writes they carry.

use super::{check_columns, into_row, Store, WriteOptions};
use crate::error::{KeelError, QueryError};
use crate::executor::Row;
use crate::query::{Condition, Direction, Include, Operator, Predicate, QueryBuilder};
use crate::schema::{DefaultValue, FieldType, ModelDefinition, RelationKind, RelationSpec};
use serde_json::Value;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl<'a> Store<'a> {
    /// Insert a row and the nested rows requested in `options.include`.
    ///
    /// A missing identifier primary key is generated (UUID v4); an
    /// auto-increment key is read back from the driver. Returns the stored
    /// row, or the reloaded row when `options.reload` is set.
    pub fn create(&self, table: &str, data: Value, options: &WriteOptions) -> Result<Row, KeelError> {
        let data = into_row(data)?;
        self.transaction(|store| store.create_in(table, data, options))
    }

    /// Create several rows in one transaction.
    pub fn create_many(&self, table: &str, rows: Vec<Value>, options: &WriteOptions) -> Result<Vec<Row>, KeelError> {
        self.transaction(|store| {
            rows.into_iter()
                .map(|data| store.create_in(table, into_row(data)?, options))
                .collect()
        })
    }

    /// Update the first row matching `filter`.
    ///
    /// Only supplied non-null fields change; omitted fields and explicit
    /// `null`s keep their stored value. Fields marked to refresh on update get
    /// the current time unless supplied.
    ///
    /// # Errors
    ///
    /// [`KeelError::NotFound`] when nothing matches; `Malformed` for an empty
    /// filter.
    pub fn update(&self, table: &str, filter: &Value, data: Value, options: &WriteOptions) -> Result<Row, KeelError> {
        let condition = Condition::parse(filter)?;
        let data = into_row(data)?;
        self.transaction(|store| {
            let row = store.update_in(table, condition, data, &options.include)?;
            store.reload(table, row, options.reload.as_ref())
        })
    }

    /// Delete matching rows and return how many were removed. Related rows
    /// are left to the store's own foreign-key actions.
    pub fn delete(&self, table: &str, filter: &Value) -> Result<u64, KeelError> {
        let model = self.model(table)?;
        let condition = Condition::parse(filter)?;
        if condition.is_empty() {
            return Err(QueryError::Malformed(format!("delete from '{}' requires a non-empty where", model.table)).into());
        }
        let result = QueryBuilder::table(&model.table)
            .condition(condition)
            .build_delete(self.executor.dialect())?
            .execute(self.executor)?;
        Ok(result.rows_affected)
    }

    fn create_in(&self, table: &str, data: Row, options: &WriteOptions) -> Result<Row, KeelError> {
        let model = self.model(table)?;
        self.check_relations(model, &options.include)?;
        let row = self.insert_row(model, data)?;
        for (name, payload) in &options.include {
            let spec = self.catalog.registry.get(&model.table, name)?;
            self.create_related(model, &row, spec, payload)?;
        }
        self.reload(table, row, options.reload.as_ref())
    }

    fn insert_row(&self, model: &ModelDefinition, mut data: Row) -> Result<Row, KeelError> {
        check_columns(model, &data)?;
        let pk = model.primary_key();
        if data.get(&pk.name).is_some_and(Value::is_null) {
            data.remove(&pk.name);
        }
        for field in &model.fields {
            let generated = (field.is_primary_key() && field.ty == FieldType::Identifier)
                || field.default_value() == Some(&DefaultValue::Uuid);
            if generated && !data.contains_key(&field.name) {
                data.insert(field.name.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }

        let result = QueryBuilder::build_insert(&model.table, &data, self.executor.dialect())?.execute(self.executor)?;

        let mut row = Row::new();
        match data.remove(&pk.name) {
            Some(key) => {
                row.insert(pk.name.clone(), key);
            }
            None => {
                if let Some(id) = result.last_insert_id {
                    row.insert(pk.name.clone(), Value::from(id));
                }
            }
        }
        row.extend(data);
        Ok(row)
    }

    fn update_in(
        &self,
        table: &str,
        condition: Condition,
        data: Row,
        relations: &[(String, Value)],
    ) -> Result<Row, KeelError> {
        let model = self.model(table)?;
        if condition.is_empty() {
            return Err(QueryError::Malformed(format!("update of '{}' requires a non-empty where", model.table)).into());
        }
        check_columns(model, &data)?;
        self.check_relations(model, relations)?;

        let mut current = self
            .fetch_first(&model.table, condition)?
            .ok_or_else(|| KeelError::NotFound {
                table: model.table.clone(),
            })?;
        let pk = &model.primary_key().name;
        let key = current.get(pk).filter(|v| !v.is_null()).cloned().ok_or_else(|| {
            QueryError::Malformed(format!("'{}' row has no primary key value", model.table))
        })?;

        let mut changes = Row::new();
        for (column, value) in data {
            if value.is_null() {
                continue;
            }
            if column == *pk {
                if value != key {
                    return Err(QueryError::Malformed(format!("primary key of '{}' cannot be changed", model.table)).into());
                }
                continue;
            }
            changes.insert(column, value);
        }

        if !changes.is_empty() {
            let now = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
            for field in model.fields.iter().filter(|f| f.auto_updates()) {
                changes.entry(field.name.clone()).or_insert_with(|| Value::String(now.clone()));
            }
            QueryBuilder::table(&model.table)
                .condition(Condition::new().eq(pk, key))
                .build_update(&changes, self.executor.dialect())?
                .execute(self.executor)?;
            current.extend(changes);
        }

        for (name, payload) in relations {
            let spec = self.catalog.registry.get(&model.table, name)?;
            self.update_related(model, &current, spec, payload)?;
        }
        Ok(current)
    }

    fn reload(&self, table: &str, row: Row, include: Option<&Include>) -> Result<Row, KeelError> {
        let Some(include) = include else {
            return Ok(row);
        };
        let model = self.model(table)?;
        let pk = &model.primary_key().name;
        let key = row.get(pk).cloned().unwrap_or(Value::Null);
        let mut reloaded = self
            .fetch_first(&model.table, Condition::new().eq(pk, key))?
            .ok_or_else(|| KeelError::NotFound {
                table: model.table.clone(),
            })?;
        self.loader()
            .attach(&model.table, std::slice::from_mut(&mut reloaded), include)?;
        Ok(reloaded)
    }

    fn check_relations(&self, model: &ModelDefinition, relations: &[(String, Value)]) -> Result<(), QueryError> {
        for (name, _) in relations {
            let spec = self.catalog.registry.get(&model.table, name)?;
            if let RelationKind::BelongsTo { foreign_key, .. } = &spec.kind {
                return Err(QueryError::Malformed(format!(
                    "'{}' is a belongs-to relation of '{}'; set '{}' instead of writing through it",
                    name, model.table, foreign_key
                )));
            }
        }
        Ok(())
    }

    fn create_related(&self, owner: &ModelDefinition, parent: &Row, spec: &RelationSpec, payload: &Value) -> Result<(), KeelError> {
        match &spec.kind {
            RelationKind::HasOne { foreign_key, local_key } => {
                let key = parent_key(parent, local_key, owner)?;
                let child = stamped(payload, foreign_key, key)?;
                self.insert_row(self.model(&spec.target)?, child)?;
            }
            RelationKind::HasMany { foreign_key, local_key } => {
                let key = parent_key(parent, local_key, owner)?;
                for item in items(payload) {
                    let child = stamped(item, foreign_key, key.clone())?;
                    self.insert_row(self.model(&spec.target)?, child)?;
                }
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
            } => {
                let key = parent_key(parent, &owner.primary_key().name, owner)?;
                let target_key = &self.model(&spec.target)?.primary_key().name;
                for item in items(payload) {
                    let related = related_id(item, target_key)?;
                    self.attach_pivot(pivot_table, foreign_pivot_key, related_pivot_key, &key, related)?;
                }
            }
            RelationKind::BelongsTo { .. } => {}
        }
        Ok(())
    }

    fn update_related(&self, owner: &ModelDefinition, parent: &Row, spec: &RelationSpec, payload: &Value) -> Result<(), KeelError> {
        let target = self.model(&spec.target)?;
        let target_key = &target.primary_key().name;
        match &spec.kind {
            RelationKind::HasOne { foreign_key, local_key } => {
                let key = parent_key(parent, local_key, owner)?;
                let child = stamped(payload, foreign_key, key.clone())?;
                let current = QueryBuilder::table(&target.table)
                    .condition(Condition::new().eq(foreign_key, key))
                    .order_by(target_key.as_str(), Direction::Asc)
                    .take(1)
                    .build_select(self.executor.dialect())
                    .fetch_all(self.executor)?;
                match current.into_iter().next() {
                    Some(existing) => {
                        let id = existing.get(target_key).cloned().unwrap_or(Value::Null);
                        self.update_in(&target.table, Condition::new().eq(target_key, id), child, &[])?;
                    }
                    None => {
                        self.insert_row(target, child)?;
                    }
                }
            }
            RelationKind::HasMany { foreign_key, local_key } => {
                let key = parent_key(parent, local_key, owner)?;
                for item in items(payload) {
                    let child = stamped(item, foreign_key, key.clone())?;
                    match child.get(target_key).filter(|id| !id.is_null()).cloned() {
                        Some(id) => {
                            self.update_in(&target.table, Condition::new().eq(target_key, id), child, &[])?;
                        }
                        None => {
                            self.insert_row(target, child)?;
                        }
                    }
                }
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
            } => {
                let key = parent_key(parent, &owner.primary_key().name, owner)?;
                let changes = PivotChanges::parse(payload)?;
                if changes.sync {
                    QueryBuilder::table(pivot_table)
                        .condition(Condition::new().eq(foreign_pivot_key, key.clone()))
                        .build_delete(self.executor.dialect())?
                        .execute(self.executor)?;
                }
                if !changes.detach.is_empty() {
                    let ids = changes
                        .detach
                        .iter()
                        .map(|item| related_id(item, target_key))
                        .collect::<Result<Vec<_>, _>>()?;
                    QueryBuilder::table(pivot_table)
                        .condition(Condition::new().eq(foreign_pivot_key, key.clone()).and(Predicate::Compare {
                            field: related_pivot_key.clone(),
                            op: Operator::In,
                            value: Value::Array(ids),
                        }))
                        .build_delete(self.executor.dialect())?
                        .execute(self.executor)?;
                }
                for item in changes.attach {
                    let related = related_id(item, target_key)?;
                    self.attach_pivot(pivot_table, foreign_pivot_key, related_pivot_key, &key, related)?;
                }
            }
            RelationKind::BelongsTo { .. } => {}
        }
        Ok(())
    }

    fn attach_pivot(
        &self,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
        parent: &Value,
        related: Value,
    ) -> Result<(), KeelError> {
        let mut link = Row::new();
        link.insert(foreign_pivot_key.to_string(), parent.clone());
        link.insert(related_pivot_key.to_string(), related);
        QueryBuilder::build_insert(pivot_table, &link, self.executor.dialect())?.execute(self.executor)?;
        Ok(())
    }
}

/// BelongsToMany update payload.
#[derive(Debug, Default)]
struct PivotChanges<'p> {
    /// Remove every existing link first
    sync: bool,
    attach: Vec<&'p Value>,
    detach: Vec<&'p Value>,
}

impl<'p> PivotChanges<'p> {
    /// A plain list attaches. An object takes `sync` (a list to replace the
    /// links with, or `true` to clear before `attach`), `attach` and `detach`.
    fn parse(payload: &'p Value) -> Result<Self, QueryError> {
        let Value::Object(map) = payload else {
            return Ok(Self {
                attach: items(payload),
                ..Self::default()
            });
        };
        let mut changes = Self::default();
        for (key, value) in map {
            match (key.as_str(), value) {
                ("sync", Value::Bool(flag)) => changes.sync = *flag,
                ("sync", list @ Value::Array(_)) => {
                    changes.sync = true;
                    changes.attach.extend(items(list));
                }
                ("attach", list) => changes.attach.extend(items(list)),
                ("detach", list) => changes.detach.extend(items(list)),
                (other, _) => {
                    return Err(QueryError::Malformed(format!(
                        "unknown belongs-to-many update key '{}'; expected sync, attach or detach",
                        other
                    )))
                }
            }
        }
        Ok(changes)
    }
}

/// List payloads yield their elements, anything else yields itself.
fn items(payload: &Value) -> Vec<&Value> {
    match payload {
        Value::Array(list) => list.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// Object payload with the foreign key set to `key`.
fn stamped(payload: &Value, foreign_key: &str, key: Value) -> Result<Row, QueryError> {
    match payload {
        Value::Object(map) => {
            let mut row = map.clone();
            row.insert(foreign_key.to_string(), key);
            Ok(row)
        }
        other => Err(QueryError::Malformed(format!("nested rows must be objects, got {}", other))),
    }
}

fn parent_key(parent: &Row, column: &str, owner: &ModelDefinition) -> Result<Value, QueryError> {
    parent
        .get(column)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| QueryError::Malformed(format!("'{}' row has no value for '{}'", owner.table, column)))
}

/// Target key from a bare id or an object carrying the target's primary key.
fn related_id(item: &Value, target_key: &str) -> Result<Value, QueryError> {
    match item {
        Value::String(_) | Value::Number(_) => Ok(item.clone()),
        Value::Object(map) => map
            .get(target_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| QueryError::Malformed(format!("linked item has no '{}': {}", target_key, item))),
        other => Err(QueryError::Malformed(format!("cannot link {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use crate::query::Include;
    use crate::schema::{ModelBuilder, Schema};
    use crate::store::{Catalog, WriteOptions};
    use crate::test_support::{row, MockExecutor};
    use crate::{KeelError, QueryError};
    use sea_query::Value;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new(
            Schema::builder()
                .model(
                    ModelBuilder::new("User")
                        .id()
                        .string("name", false)
                        .unique()
                        .datetime("updated_at", true)
                        .has_many("Post")
                        .has_one("Profile"),
                )
                .model(
                    ModelBuilder::new("Post")
                        .id()
                        .string("title", false)
                        .belongs_to("User")
                        .belongs_to_many("Tag"),
                )
                .model(ModelBuilder::new("Profile").id().string("bio", true).belongs_to("User"))
                .model(ModelBuilder::new("Tag").id().string("label", false))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn create_generates_key_and_links_pivot_rows() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);

        let post = store
            .create(
                "post",
                json!({"title": "Hello", "user_id": "u1"}),
                &WriteOptions::new().with("tags", json!(["t1", {"id": "t2"}])),
            )
            .unwrap();
        let id = post["id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 36);

        let statements = executor.statements();
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
        assert_eq!(
            statements[1],
            r#"INSERT INTO "post" ("title", "user_id", "id") VALUES (?, ?, ?)"#
        );
        assert_eq!(
            statements[2],
            r#"INSERT INTO "post_tag" ("post_id", "tag_id") VALUES (?, ?)"#
        );
        let params = executor.params();
        assert_eq!(params[2], vec![Value::from(id.clone()), Value::from("t1")]);
        assert_eq!(params[3], vec![Value::from(id), Value::from("t2")]);
    }

    #[test]
    fn create_stamps_foreign_keys_on_children() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);

        store
            .create(
                "user",
                json!({"id": "u1", "name": "ada"}),
                &WriteOptions::new()
                    .with("posts", json!([{"id": "p1", "title": "A"}, {"id": "p2", "title": "B"}]))
                    .with("profile", json!({"id": "pr1", "bio": "hi"})),
            )
            .unwrap();

        let params = executor.params();
        assert_eq!(params[2].last(), Some(&Value::from("u1")));
        assert_eq!(params[3].last(), Some(&Value::from("u1")));
        assert!(executor.statements()[4].starts_with(r#"INSERT INTO "profile""#));
    }

    #[test]
    fn belongs_to_writes_and_unknown_fields_are_rejected() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);

        let err = store
            .create("post", json!({"title": "x"}), &WriteOptions::new().with("user", json!({"name": "a"})))
            .unwrap_err();
        assert!(matches!(err, KeelError::Query(QueryError::Malformed(_))));

        let err = store.create("user", json!({"nickname": "a"}), &WriteOptions::new()).unwrap_err();
        assert!(matches!(err, KeelError::Query(QueryError::Malformed(_))));
        assert!(!executor.statements().iter().any(|s| s.starts_with("INSERT")));
    }

    #[test]
    fn update_keeps_null_fields_and_stamps_timestamps() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        executor.push_rows(vec![row(json!({"id": "u1", "name": "ada", "updated_at": null}))]);
        let store = catalog.store(&executor);

        let updated = store
            .update("user", &json!({"name": "ada"}), json!({"name": null, "id": "u1"}), &WriteOptions::new())
            .unwrap();
        assert_eq!(updated["name"], "ada");
        assert!(!executor.statements().iter().any(|s| s.starts_with("UPDATE")));

        executor.push_rows(vec![row(json!({"id": "u1", "name": "ada", "updated_at": null}))]);
        let updated = store
            .update("user", &json!({"id": "u1"}), json!({"name": "grace"}), &WriteOptions::new())
            .unwrap();
        assert_eq!(updated["name"], "grace");
        assert!(updated["updated_at"].is_string());
        assert!(executor
            .statements()
            .contains(&r#"UPDATE "user" SET "name" = ?, "updated_at" = ? WHERE "id" = ?"#.to_string()));
    }

    #[test]
    fn update_missing_row_is_not_found_and_empty_filters_are_refused() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);

        let err = store
            .update("user", &json!({"id": "nope"}), json!({"name": "x"}), &WriteOptions::new())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(executor.statements().last().map(String::as_str), Some("ROLLBACK"));

        assert!(matches!(
            store.update("user", &json!({}), json!({"name": "x"}), &WriteOptions::new()),
            Err(KeelError::Query(QueryError::Malformed(_)))
        ));
        assert!(matches!(
            store.delete("user", &json!({})),
            Err(KeelError::Query(QueryError::Malformed(_)))
        ));
    }

    #[test]
    fn update_syncs_pivot_links() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        executor.push_rows(vec![row(json!({"id": "p1", "title": "A", "user_id": "u1"}))]);
        let store = catalog.store(&executor);

        store
            .update(
                "post",
                &json!({"id": "p1"}),
                json!({}),
                &WriteOptions::new().with("tags", json!({"sync": ["t3"], "detach": ["t1"]})),
            )
            .unwrap();

        let statements = executor.statements();
        assert_eq!(statements[2], r#"DELETE FROM "post_tag" WHERE "post_id" = ?"#);
        assert_eq!(
            statements[3],
            r#"DELETE FROM "post_tag" WHERE "post_id" = ? AND "tag_id" IN (?)"#
        );
        assert_eq!(statements[4], r#"INSERT INTO "post_tag" ("post_id", "tag_id") VALUES (?, ?)"#);
    }

    #[test]
    fn update_upserts_has_one_and_splits_has_many() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        executor.push_rows(vec![row(json!({"id": "u1", "name": "ada", "updated_at": null}))]);
        executor.push_rows(vec![]);
        executor.push_rows(vec![row(json!({"id": "p1", "title": "A", "user_id": "u1"}))]);
        let store = catalog.store(&executor);

        store
            .update(
                "user",
                &json!({"id": "u1"}),
                json!({}),
                &WriteOptions::new()
                    .with("profile", json!({"id": "pr1", "bio": "new"}))
                    .with("posts", json!([{"id": "p1", "title": "Edited"}, {"id": null, "title": "Fresh"}])),
            )
            .unwrap();

        let statements = executor.statements();
        assert_eq!(
            statements[2],
            r#"SELECT * FROM "profile" WHERE "user_id" = ? ORDER BY "id" ASC LIMIT ?"#
        );
        assert!(statements[3].starts_with(r#"INSERT INTO "profile""#));
        assert_eq!(statements[4], r#"SELECT * FROM "post" WHERE "id" = ? LIMIT ?"#);
        assert_eq!(statements[5], r#"UPDATE "post" SET "title" = ?, "user_id" = ? WHERE "id" = ?"#);
        assert!(statements[6].starts_with(r#"INSERT INTO "post""#));
    }

    #[test]
    fn reload_reads_back_with_relations() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        executor.push_rows(vec![row(json!({"id": "u1", "name": "ada", "updated_at": null}))]);
        executor.push_rows(vec![row(json!({"id": "p1", "title": "A", "user_id": "u1"}))]);
        let store = catalog.store(&executor);

        let user = store
            .create(
                "user",
                json!({"id": "u1", "name": "ada"}),
                &WriteOptions::new().reload(Include::new().relation("posts")),
            )
            .unwrap();
        assert_eq!(user["posts"][0]["id"], "p1");
    }
}
