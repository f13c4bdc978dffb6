//! Reads: `find_many`, `find_first`, `find_unique`.

use super::Store;
use crate::error::{KeelError, QueryError};
use crate::executor::Row;
use crate::query::{Condition, FindOptions, QueryBuilder};

impl<'a> Store<'a> {
    /// Every matching row, with includes attached.
    pub fn find_many(&self, table: &str, options: &FindOptions) -> Result<Vec<Row>, KeelError> {
        self.find(table, options, options.take)
    }

    /// The first matching row, or `None`. Never raises `NotFound`.
    pub fn find_first(&self, table: &str, options: &FindOptions) -> Result<Option<Row>, KeelError> {
        Ok(self.find(table, options, Some(1))?.into_iter().next())
    }

    /// The matching row.
    ///
    /// # Errors
    ///
    /// Returns [`KeelError::NotFound`] when nothing matches.
    pub fn find_unique(&self, table: &str, options: &FindOptions) -> Result<Row, KeelError> {
        match self.find_first(table, options)? {
            Some(row) => Ok(row),
            None => Err(KeelError::NotFound {
                table: self.model(table)?.table.clone(),
            }),
        }
    }

    fn find(&self, table: &str, options: &FindOptions, take: Option<u64>) -> Result<Vec<Row>, KeelError> {
        let model = self.model(table)?;
        let mut builder = QueryBuilder::table(&model.table)
            .condition(options.filter.clone())
            .order_by_spec(&options.order_by);
        if let Some(columns) = &options.select {
            builder = builder.select(columns.iter().cloned());
        }
        if let Some(take) = take {
            builder = builder.take(take);
        }
        if let Some(skip) = options.skip {
            builder = builder.skip(skip);
        }

        let mut rows = builder.build_select(self.executor.dialect()).fetch_all(self.executor)?;
        self.loader().attach(&model.table, &mut rows, &options.include)?;
        Ok(rows)
    }

    /// First row of `table` matching `condition`, without includes.
    pub(super) fn fetch_first(&self, table: &str, condition: Condition) -> Result<Option<Row>, QueryError> {
        let rows = QueryBuilder::table(table)
            .condition(condition)
            .take(1)
            .build_select(self.executor.dialect())
            .fetch_all(self.executor)?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{FindOptions, Include};
    use crate::schema::{ModelBuilder, Schema};
    use crate::store::Catalog;
    use crate::test_support::{row, MockExecutor};
    use crate::{KeelError, QueryError};
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new(
            Schema::builder()
                .model(ModelBuilder::new("User").id().string("name", false).has_many("Post"))
                .model(ModelBuilder::new("Post").id().string("title", false).belongs_to("User"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn find_unique_and_find_first_differ_on_zero_rows() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);
        let options = FindOptions::filter(&json!({"name": "nobody"})).unwrap();

        assert!(store.find_first("user", &options).unwrap().is_none());
        let err = store.find_unique("users", &options).unwrap_err();
        assert!(matches!(err, KeelError::NotFound { ref table } if table == "user"));
    }

    #[test]
    fn find_many_pages_and_attaches_includes() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        executor.push_rows(vec![row(json!({"id": "u1", "name": "ada"}))]);
        executor.push_rows(vec![row(json!({"id": "p1", "title": "Notes", "user_id": "u1"}))]);
        let store = catalog.store(&executor);

        let options = FindOptions::parse(&json!({
            "orderBy": {"name": "desc"},
            "take": 5,
            "skip": 10,
            "include": ["posts"],
        }))
        .unwrap();
        let rows = store.find_many("user", &options).unwrap();

        assert_eq!(rows[0]["posts"][0]["title"], "Notes");
        assert_eq!(
            executor.statements()[0],
            r#"SELECT * FROM "user" ORDER BY "name" DESC LIMIT ? OFFSET ?"#
        );
        assert_eq!(
            executor.statements()[1],
            r#"SELECT * FROM "post" WHERE "user_id" = ?"#
        );
    }

    #[test]
    fn unknown_models_and_relations_fail_fast() {
        let catalog = catalog();
        let executor = MockExecutor::new();
        let store = catalog.store(&executor);

        assert!(matches!(
            store.find_many("invoice", &FindOptions::new()),
            Err(KeelError::Query(QueryError::UnknownModel(_)))
        ));
        let options = FindOptions::new().include(Include::new().relation("comments"));
        assert!(matches!(
            store.find_many("user", &options),
            Err(KeelError::Query(QueryError::UnknownRelation { .. }))
        ));
    }
}
