//! Data-Access Facade
//!
//! [`Catalog`] holds the schema and its relation registry, built once per
//! process. [`Store`] pairs a catalog with one executor (one connection
//! context) and offers transactional create/find/update/delete with eager
//! relation loading and nested relation writes.
//!
//! ```
//! use keel::schema::{ModelBuilder, Schema};
//! use keel::store::{Catalog, WriteOptions};
//! use keel::query::{FindOptions, Include};
//! use keel::migration::SchemaManager;
//! use keel::SqliteExecutor;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::builder()
//!     .model(ModelBuilder::new("User").id().string("name", false).unique().has_many("Post"))
//!     .model(ModelBuilder::new("Post").id().string("title", false).belongs_to("User"))
//!     .build()?;
//! let executor = SqliteExecutor::open_in_memory()?;
//! SchemaManager::new(&executor).sync(&schema)?;
//!
//! let catalog = Catalog::new(schema);
//! let store = catalog.store(&executor);
//! let user = store.create(
//!     "user",
//!     json!({"name": "ada"}),
//!     &WriteOptions::new().with("posts", json!([{"title": "Notes"}])),
//! )?;
//!
//! let found = store.find_unique(
//!     "user",
//!     &FindOptions::filter(&json!({"id": user["id"]}))?.include(Include::new().relation("posts")),
//! )?;
//! assert_eq!(found["posts"][0]["title"], "Notes");
//! # Ok(())
//! # }
//! ```

mod read;
mod write;

use crate::error::{KeelError, QueryError};
use crate::executor::{Executor, Row};
use crate::query::{Include, RelationOptions};
use crate::relation::{Loaded, RelationLoader, RelationRegistry};
use crate::schema::{ModelDefinition, Schema};
use crate::transaction::run_in_transaction;

/// Schema plus the relation registry derived from it.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: Schema,
    registry: RelationRegistry,
}

impl Catalog {
    pub fn new(schema: Schema) -> Self {
        let registry = RelationRegistry::from_schema(&schema);
        Self { schema, registry }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Facade over one executor.
    pub fn store<'a>(&'a self, executor: &'a dyn Executor) -> Store<'a> {
        Store {
            executor,
            catalog: self,
        }
    }
}

/// Options for `create` and `update`.
///
/// `include` maps relation names to nested write payloads:
/// - HasOne: an object (`update` upserts it)
/// - HasMany: a list of objects (`update` updates items carrying a primary key
///   and creates the rest)
/// - BelongsToMany: a list of target keys or `{id}` objects to attach; on
///   `update` also `{"sync": [...], "attach": [...], "detach": [...]}`
///
/// `reload` re-reads the written row, with the given relations, before
/// returning it.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub include: Vec<(String, serde_json::Value)>,
    pub reload: Option<Include>,
}

pub type CreateOptions = WriteOptions;
pub type UpdateOptions = WriteOptions;

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nested write for one relation
    pub fn with(mut self, relation: impl Into<String>, payload: serde_json::Value) -> Self {
        self.include.push((relation.into(), payload));
        self
    }

    pub fn reload(mut self, include: Include) -> Self {
        self.reload = Some(include);
        self
    }

    /// Parse `{"include": {relation: payload}, "reload": true | include-spec}`.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        let mut options = Self::new();
        let map = match spec {
            serde_json::Value::Null => return Ok(options),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(QueryError::Malformed(format!(
                    "write options must be an object, got {}",
                    other
                )))
            }
        };
        for (key, value) in map {
            match key.as_str() {
                "include" => match value {
                    serde_json::Value::Object(relations) => {
                        for (name, payload) in relations {
                            options.include.push((name.clone(), payload.clone()));
                        }
                    }
                    serde_json::Value::Null => {}
                    other => {
                        return Err(QueryError::Malformed(format!(
                            "include must map relation names to payloads, got {}",
                            other
                        )))
                    }
                },
                "reload" | "return" => {
                    options.reload = match value {
                        serde_json::Value::Bool(false) | serde_json::Value::Null => None,
                        serde_json::Value::Bool(true) => Some(Include::new()),
                        spec => Some(Include::parse(spec)?),
                    }
                }
                other => return Err(QueryError::Malformed(format!("unknown write option '{}'", other))),
            }
        }
        Ok(options)
    }
}

/// Data-access facade bound to one executor.
///
/// Every write runs in a transaction, or joins the one already open on the
/// executor, so a write and all of its nested relation writes persist
/// together or not at all.
#[derive(Clone, Copy)]
pub struct Store<'a> {
    executor: &'a dyn Executor,
    catalog: &'a Catalog,
}

impl<'a> Store<'a> {
    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn loader(&self) -> RelationLoader<'a> {
        RelationLoader::new(self.executor, &self.catalog.registry)
    }

    /// Load one relation of a row fetched from `table`.
    pub fn load(
        &self,
        table: &str,
        row: &Row,
        relation: &str,
        options: &RelationOptions,
    ) -> Result<Loaded, KeelError> {
        Ok(self.loader().load(table, row, relation, options)?)
    }

    /// Run `work` in a transaction: commit on success, roll back and return
    /// the error on failure. Inside an open transaction, `work` joins it.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, KeelError>
    where
        F: FnOnce(&Store<'a>) -> Result<T, KeelError>,
    {
        run_in_transaction(self.executor, || work(self))
    }

    fn model(&self, table: &str) -> Result<&'a ModelDefinition, QueryError> {
        self.catalog
            .schema
            .model(table)
            .ok_or_else(|| QueryError::UnknownModel(table.to_string()))
    }
}

/// Reject columns the model does not declare.
fn check_columns(model: &ModelDefinition, data: &Row) -> Result<(), QueryError> {
    match data.keys().find(|column| model.field(column).is_none()) {
        Some(column) => Err(QueryError::Malformed(format!(
            "model '{}' has no field '{}'",
            model.table, column
        ))),
        None => Ok(()),
    }
}

fn into_row(data: serde_json::Value) -> Result<Row, QueryError> {
    match data {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(QueryError::Malformed(format!("row data must be an object, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_options_parse() {
        let options = WriteOptions::parse(&json!({
            "include": {"tags": ["t1", "t2"], "profile": {"bio": "hi"}},
            "return": true,
        }))
        .unwrap();
        assert_eq!(options.include.len(), 2);
        assert_eq!(options.include[0].0, "tags");
        assert!(options.reload.as_ref().is_some_and(Include::is_empty));

        let nested = WriteOptions::parse(&json!({"reload": ["posts"]})).unwrap();
        assert!(!nested.reload.unwrap().is_empty());

        assert!(WriteOptions::parse(&json!({"includes": {}})).is_err());
        assert!(WriteOptions::parse(&json!({"include": ["tags"]})).is_err());
    }
}
