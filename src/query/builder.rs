//! Statement builder.
//!
//! `QueryBuilder` collects a table, projection, predicates, ordering and paging
//! and renders them through sea-query for a [`Dialect`]. The builder is created
//! per query and consumed by value, like the select builders it wraps.

use super::condition::Condition;
use super::options::{Direction, OrderBy};
use super::{Ident, Statement};
use crate::error::QueryError;
use crate::executor::{BuildFor, Dialect, Row};
use crate::value::to_value;
use sea_query::{Asterisk, Expr, ExprTrait, JoinType, Query, SelectStatement};

/// An `INNER JOIN joined ON joined.joined_column = base.base_column`.
#[derive(Debug, Clone, PartialEq)]
struct Join {
    table: String,
    joined_column: String,
    base_column: String,
}

/// A column equality pinned to a specific table, bound before caller predicates.
#[derive(Debug, Clone, PartialEq)]
struct Scope {
    table: String,
    column: String,
    value: serde_json::Value,
}

/// Builder for parameterized SELECT, INSERT, UPDATE and DELETE statements.
///
/// # Example
///
/// ```
/// use keel::query::{Direction, QueryBuilder};
/// use keel::Dialect;
/// use serde_json::json;
///
/// let stmt = QueryBuilder::table("post")
///     .filter(&json!({"views": [">", 10]}))?
///     .order_by("created_at", Direction::Desc)
///     .take(5)
///     .skip(10)
///     .build_select(Dialect::Postgres);
///
/// assert_eq!(
///     stmt.sql,
///     r#"SELECT * FROM "post" WHERE "views" > $1 ORDER BY "created_at" DESC LIMIT $2 OFFSET $3"#
/// );
/// # Ok::<(), keel::QueryError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table: String,
    select: Option<Vec<String>>,
    joins: Vec<Join>,
    scopes: Vec<Scope>,
    condition: Condition,
    order: OrderBy,
    take: Option<u64>,
    skip: Option<u64>,
}

impl QueryBuilder {
    pub fn table(table: impl Into<String>) -> Self {
        QueryBuilder {
            table: table.into(),
            select: None,
            joins: Vec::new(),
            scopes: Vec::new(),
            condition: Condition::new(),
            order: OrderBy::new(),
            take: None,
            skip: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Restrict the returned columns. Without it every column is returned.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Parse a predicate object and AND it onto the current condition.
    pub fn filter(self, spec: &serde_json::Value) -> Result<Self, QueryError> {
        Ok(self.condition(Condition::parse(spec)?))
    }

    /// AND an already parsed condition onto the current one.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = std::mem::take(&mut self.condition).and_all(condition);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = std::mem::take(&mut self.order).then(field, direction);
        self
    }

    /// Append every entry of an [`OrderBy`] in its own order.
    pub fn order_by_spec(self, order: &OrderBy) -> Self {
        order
            .entries()
            .iter()
            .fold(self, |builder, (field, direction)| builder.order_by(field.clone(), *direction))
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Join another table on `joined.joined_column = base.base_column`.
    ///
    /// Once a join is present, projection, predicates and ordering are
    /// qualified with the base table.
    pub fn inner_join(
        mut self,
        joined: impl Into<String>,
        joined_column: impl Into<String>,
        base_column: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: joined.into(),
            joined_column: joined_column.into(),
            base_column: base_column.into(),
        });
        self
    }

    /// Require `table.column = value`, bound ahead of the caller's predicates.
    pub fn scope(mut self, table: impl Into<String>, column: impl Into<String>, value: serde_json::Value) -> Self {
        self.scopes.push(Scope {
            table: table.into(),
            column: column.into(),
            value,
        });
        self
    }

    pub fn has_predicates(&self) -> bool {
        !self.scopes.is_empty() || !self.condition.is_empty()
    }

    fn qualifier(&self) -> Option<&str> {
        if self.joins.is_empty() {
            None
        } else {
            Some(self.table.as_str())
        }
    }

    fn where_condition(&self) -> Option<sea_query::Condition> {
        if !self.has_predicates() {
            return None;
        }
        let scoped = self.scopes.iter().fold(sea_query::Condition::all(), |acc, scope| {
            let col = Expr::col((Ident::new(&scope.table), Ident::new(&scope.column)));
            if serde_json::Value::is_null(&scope.value) {
                acc.add(col.is_null())
            } else {
                acc.add(col.eq(to_value(&scope.value)))
            }
        });
        Some(self.condition.apply(scoped, self.qualifier()))
    }

    /// The sea-query SELECT this builder describes.
    pub fn select_statement(&self) -> SelectStatement {
        let mut query = Query::select();
        let qualifier = self.qualifier();

        match (&self.select, qualifier) {
            (Some(columns), Some(table)) => {
                for column in columns {
                    query.column((Ident::new(table), Ident::new(column)));
                }
            }
            (Some(columns), None) => {
                query.columns(columns.iter().map(Ident::new));
            }
            (None, Some(table)) => {
                query.column((Ident::new(table), Asterisk));
            }
            (None, None) => {
                query.column(Asterisk);
            }
        }
        query.from(Ident::new(&self.table));

        for join in &self.joins {
            query.join(
                JoinType::InnerJoin,
                Ident::new(&join.table),
                Expr::col((Ident::new(&join.table), Ident::new(&join.joined_column)))
                    .equals((Ident::new(&self.table), Ident::new(&join.base_column))),
            );
        }

        if let Some(condition) = self.where_condition() {
            query.cond_where(condition);
        }

        for (field, direction) in self.order.entries() {
            match qualifier {
                Some(table) => query.order_by((Ident::new(table), Ident::new(field)), direction.to_order()),
                None => query.order_by(Ident::new(field), direction.to_order()),
            };
        }

        if let Some(take) = self.take {
            query.limit(take);
            if let Some(skip) = self.skip {
                query.offset(skip);
            }
        }
        query
    }

    pub fn build_select(&self, dialect: Dialect) -> Statement {
        Statement::from_parts(self.select_statement().build_for(dialect))
    }

    /// INSERT one row; columns follow the row's key order.
    pub fn build_insert(table: &str, row: &Row, dialect: Dialect) -> Result<Statement, QueryError> {
        let mut insert = Query::insert();
        insert.into_table(Ident::new(table));
        if row.is_empty() {
            insert.or_default_values();
        } else {
            insert.columns(row.keys().map(Ident::new));
            insert
                .values(row.values().map(|v| Expr::val(to_value(v))))
                .map_err(|e| QueryError::Malformed(e.to_string()))?;
        }
        Ok(Statement::from_parts(insert.build_for(dialect)))
    }

    /// UPDATE the matching rows. SET parameters precede WHERE parameters.
    pub fn build_update(&self, data: &Row, dialect: Dialect) -> Result<Statement, QueryError> {
        if data.is_empty() {
            return Err(QueryError::Malformed(format!(
                "update of '{}' has no columns to set",
                self.table
            )));
        }
        let condition = self.where_condition().ok_or_else(|| {
            QueryError::Malformed(format!("update of '{}' requires a where clause", self.table))
        })?;

        let mut update = Query::update();
        update.table(Ident::new(&self.table));
        for (column, value) in data {
            update.value(Ident::new(column), to_value(value));
        }
        update.cond_where(condition);
        Ok(Statement::from_parts(update.build_for(dialect)))
    }

    /// DELETE the matching rows.
    pub fn build_delete(&self, dialect: Dialect) -> Result<Statement, QueryError> {
        let condition = self.where_condition().ok_or_else(|| {
            QueryError::Malformed(format!("delete from '{}' requires a where clause", self.table))
        })?;

        let mut delete = Query::delete();
        delete.from_table(Ident::new(&self.table)).cond_where(condition);
        Ok(Statement::from_parts(delete.build_for(dialect)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::row;
    use sea_query::Value;
    use serde_json::json;

    #[test]
    fn or_group_is_parenthesized_and_params_keep_order() {
        let stmt = QueryBuilder::table("user")
            .filter(&json!({"status": "active", "OR": [{"role": "admin"}, {"role": "owner"}]}))
            .unwrap()
            .build_select(Dialect::Sqlite);

        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "user" WHERE "status" = ? AND ("role" = ? OR "role" = ?)"#
        );
        assert_eq!(
            stmt.values,
            vec![Value::from("active"), Value::from("admin"), Value::from("owner")]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let build = || {
            QueryBuilder::table("user")
                .filter(&json!({"b": 1, "a": ["IN", [1, 2]], "c": ["LIKE", "x%"]}))
                .unwrap()
                .order_by("a", Direction::Asc)
                .build_select(Dialect::MySql)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn offset_requires_limit() {
        let without = QueryBuilder::table("user").skip(10).build_select(Dialect::Sqlite);
        assert!(!without.sql.contains("OFFSET"));

        let with = QueryBuilder::table("user").take(5).skip(10).build_select(Dialect::Sqlite);
        assert!(with.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(with.values, vec![Value::from(5u64), Value::from(10u64)]);
    }

    #[test]
    fn order_entries_render_in_call_order_uppercased() {
        let order = OrderBy::parse(&json!({"name": "asc", "age": "desc"})).unwrap();
        let stmt = QueryBuilder::table("user")
            .order_by("id", Direction::Desc)
            .order_by_spec(&order)
            .build_select(Dialect::Sqlite);
        assert!(stmt.sql.ends_with(r#"ORDER BY "id" DESC, "name" ASC, "age" DESC"#));
    }

    #[test]
    fn update_binds_set_before_where() {
        let stmt = QueryBuilder::table("user")
            .filter(&json!({"id": "u1"}))
            .unwrap()
            .build_update(&row(json!({"name": "Ada", "age": 36})), Dialect::Postgres)
            .unwrap();

        assert_eq!(
            stmt.sql,
            r#"UPDATE "user" SET "name" = $1, "age" = $2 WHERE "id" = $3"#
        );
        assert_eq!(
            stmt.values,
            vec![Value::from("Ada"), Value::from(36i64), Value::from("u1")]
        );
    }

    #[test]
    fn unfiltered_update_and_delete_are_rejected() {
        let builder = QueryBuilder::table("user");
        assert!(matches!(
            builder.build_update(&row(json!({"a": 1})), Dialect::Sqlite),
            Err(QueryError::Malformed(_))
        ));
        assert!(matches!(builder.build_delete(Dialect::Sqlite), Err(QueryError::Malformed(_))));

        let filtered = QueryBuilder::table("user").filter(&json!({"id": 1})).unwrap();
        assert!(matches!(
            filtered.build_update(&Row::new(), Dialect::Sqlite),
            Err(QueryError::Malformed(_))
        ));
    }

    #[test]
    fn delete_uses_where_compiler() {
        let stmt = QueryBuilder::table("post")
            .filter(&json!({"user_id": "u1", "archived": true}))
            .unwrap()
            .build_delete(Dialect::MySql)
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `post` WHERE `user_id` = ? AND `archived` = ?");
        assert_eq!(stmt.values.len(), 2);
    }

    #[test]
    fn insert_follows_row_order() {
        let stmt = QueryBuilder::build_insert(
            "tag",
            &row(json!({"id": "t1", "label": "rust"})),
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(stmt.sql, r#"INSERT INTO "tag" ("id", "label") VALUES (?, ?)"#);
        assert_eq!(stmt.values, vec![Value::from("t1"), Value::from("rust")]);
    }

    #[test]
    fn joins_qualify_columns_and_bind_scope_first() {
        let stmt = QueryBuilder::table("tag")
            .inner_join("post_tag", "tag_id", "id")
            .scope("post_tag", "post_id", json!("p1"))
            .filter(&json!({"label": ["LIKE", "r%"]}))
            .unwrap()
            .order_by("label", Direction::Asc)
            .build_select(Dialect::Sqlite);

        assert_eq!(
            stmt.sql,
            concat!(
                r#"SELECT "tag".* FROM "tag" INNER JOIN "post_tag" ON "post_tag"."tag_id" = "tag"."id" "#,
                r#"WHERE "post_tag"."post_id" = ? AND "tag"."label" LIKE ? ORDER BY "tag"."label" ASC"#
            )
        );
        assert_eq!(stmt.values, vec![Value::from("p1"), Value::from("r%")]);
    }

    #[test]
    fn null_scope_becomes_is_null() {
        let stmt = QueryBuilder::table("post")
            .scope("post", "user_id", serde_json::Value::Null)
            .build_select(Dialect::Sqlite);
        assert_eq!(stmt.sql, r#"SELECT * FROM "post" WHERE "post"."user_id" IS NULL"#);
        assert!(stmt.values.is_empty());
    }
}
