//! Ordering, paging, projection and include options.
//!
//! Options are accepted either as Rust values built with the fluent helpers or
//! parsed from JSON, e.g.
//!
//! ```json
//! {
//!   "where": {"status": "active"},
//!   "orderBy": {"created_at": "desc"},
//!   "take": 10,
//!   "skip": 20,
//!   "include": {"posts": {"orderBy": ["title", "asc"], "include": ["tags"]}}
//! }
//! ```
//!
//! Unknown keys and wrong shapes are rejected with [`QueryError::Malformed`].

use super::condition::Condition;
use crate::error::QueryError;
use std::fmt;
use std::str::FromStr;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn to_order(self) -> sea_query::Order {
        match self {
            Direction::Asc => sea_query::Order::Asc,
            Direction::Desc => sea_query::Order::Desc,
        }
    }
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(QueryError::Malformed(format!("unknown sort direction '{}'", s))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

/// Ordered list of sort keys; entries keep the order they were added in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy(Vec<(String, Direction)>);

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[(String, Direction)] {
        &self.0
    }

    /// Accepts `{"field": "desc", ...}`, `["field", "desc"]`, a bare field name
    /// (ascending) or a list of maps.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        let mut order = OrderBy::new();
        order.extend_from(spec)?;
        Ok(order)
    }

    fn extend_from(&mut self, spec: &serde_json::Value) -> Result<(), QueryError> {
        match spec {
            serde_json::Value::Null => Ok(()),
            serde_json::Value::String(field) => {
                self.0.push((field.clone(), Direction::Asc));
                Ok(())
            }
            serde_json::Value::Object(map) => {
                for (field, direction) in map {
                    let direction = direction.as_str().ok_or_else(|| {
                        QueryError::Malformed(format!("direction for '{}' must be a string", field))
                    })?;
                    self.0.push((field.clone(), direction.parse()?));
                }
                Ok(())
            }
            serde_json::Value::Array(items) => match items.as_slice() {
                [serde_json::Value::String(field), serde_json::Value::String(direction)] => {
                    self.0.push((field.clone(), direction.parse()?));
                    Ok(())
                }
                _ if items.iter().all(|i| i.is_object()) => {
                    items.iter().try_for_each(|item| self.extend_from(item))
                }
                _ => Err(QueryError::Malformed(format!("unsupported orderBy shape: {}", spec))),
            },
            other => Err(QueryError::Malformed(format!("unsupported orderBy shape: {}", other))),
        }
    }
}

/// Options applied to the rows of one included relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationOptions {
    pub select: Option<Vec<String>>,
    pub filter: Condition,
    pub order_by: OrderBy,
    pub take: Option<u64>,
    pub skip: Option<u64>,
    pub include: Include,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = condition;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = self.order_by.then(field, direction);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = include;
        self
    }

    /// `true` means "load with defaults"; an object carries the option keys.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        match spec {
            serde_json::Value::Bool(true) | serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => {
                let mut options = Self::default();
                for (key, value) in map {
                    match key.as_str() {
                        "select" => options.select = Some(parse_select(value)?),
                        "where" => options.filter = Condition::parse(value)?,
                        "orderBy" | "order_by" => options.order_by = OrderBy::parse(value)?,
                        "take" => options.take = parse_count("take", value)?,
                        "skip" => options.skip = parse_count("skip", value)?,
                        "include" => options.include = Include::parse(value)?,
                        other => {
                            return Err(QueryError::Malformed(format!(
                                "unknown relation option '{}'",
                                other
                            )))
                        }
                    }
                }
                Ok(options)
            }
            other => Err(QueryError::Malformed(format!(
                "relation options must be true or an object, got {}",
                other
            ))),
        }
    }
}

/// Relations to eager-load, by relation name, in request order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Include(Vec<(String, RelationOptions)>);

impl Include {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(self, name: impl Into<String>) -> Self {
        self.with(name, RelationOptions::default())
    }

    pub fn with(mut self, name: impl Into<String>, options: RelationOptions) -> Self {
        self.0.push((name.into(), options));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationOptions)> {
        self.0.iter().map(|(name, options)| (name.as_str(), options))
    }

    /// Accepts `["posts", "profile"]` or `{"posts": true, "profile": {...}}`.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        match spec {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::String(name) => Ok(Self::new().relation(name.clone())),
            serde_json::Value::Array(items) => items.iter().try_fold(Self::new(), |acc, item| {
                item.as_str()
                    .map(|name| acc.relation(name))
                    .ok_or_else(|| QueryError::Malformed(format!("include list entries must be names, got {}", item)))
            }),
            serde_json::Value::Object(map) => map.iter().try_fold(Self::new(), |acc, (name, options)| {
                Ok(acc.with(name.clone(), RelationOptions::parse(options)?))
            }),
            other => Err(QueryError::Malformed(format!("unsupported include shape: {}", other))),
        }
    }
}

/// Options for `find_many`, `find_first` and `find_unique`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindOptions {
    pub filter: Condition,
    pub order_by: OrderBy,
    pub take: Option<u64>,
    pub skip: Option<u64>,
    pub select: Option<Vec<String>>,
    pub include: Include,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options matching a predicate object.
    pub fn filter(spec: &serde_json::Value) -> Result<Self, QueryError> {
        Ok(Self {
            filter: Condition::parse(spec)?,
            ..Self::default()
        })
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = self.order_by.then(field, direction);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = include;
        self
    }

    /// Restrict the returned columns. Keep the keys that included relations
    /// join on, or those relations load empty.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Parse `{"where", "orderBy", "take", "skip", "select", "include"}`.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        let relation = RelationOptions::parse(spec)?;
        Ok(Self {
            filter: relation.filter,
            order_by: relation.order_by,
            take: relation.take,
            skip: relation.skip,
            select: relation.select,
            include: relation.include,
        })
    }
}

fn parse_select(value: &serde_json::Value) -> Result<Vec<String>, QueryError> {
    let columns = value
        .as_array()
        .ok_or_else(|| QueryError::Malformed(format!("select must be a list of columns, got {}", value)))?;
    columns
        .iter()
        .map(|c| {
            c.as_str()
                .map(str::to_string)
                .ok_or_else(|| QueryError::Malformed(format!("select entries must be names, got {}", c)))
        })
        .collect()
}

fn parse_count(key: &str, value: &serde_json::Value) -> Result<Option<u64>, QueryError> {
    match value {
        serde_json::Value::Null => Ok(None),
        v => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| QueryError::Malformed(format!("{} must be a non-negative integer, got {}", key, v))),
    }
}
