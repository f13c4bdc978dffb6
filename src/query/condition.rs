//! Predicate trees.
//!
//! A [`Condition`] is parsed from a JSON object:
//! - `{"field": value}` is equality (`null` becomes `IS NULL`)
//! - `{"field": [operator, value]}` is an explicit comparison
//! - `{"OR": [{...}, {...}]}` is a parenthesized disjunction of sub-conditions
//! - `{"AND": [{...}, {...}]}` groups sub-conditions explicitly
//!
//! Top-level entries are ANDed in key order.

use super::Ident;
use crate::error::QueryError;
use crate::value::to_value;
use sea_query::{Expr, ExprTrait};
use std::fmt;
use std::str::FromStr;

/// Comparison operator in a `[operator, value]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let op = match normalized.as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            _ => return Err(QueryError::Malformed(format!("unsupported operator '{}'", s))),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        };
        f.write_str(text)
    }
}

/// One node of a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: Operator,
        value: serde_json::Value,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Any(Vec<Condition>),
    All(Vec<Condition>),
}

/// Conjunction of predicates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// AND another predicate onto this condition.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// AND all predicates of another condition onto this one.
    pub fn and_all(mut self, other: Condition) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// Equality shorthand; a JSON `null` becomes `IS NULL`.
    pub fn eq(self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        let value = value.into();
        if serde_json::Value::is_null(&value) {
            self.and(Predicate::IsNull {
                field: field.to_string(),
                negated: false,
            })
        } else {
            self.and(Predicate::Compare {
                field: field.to_string(),
                op: Operator::Eq,
                value,
            })
        }
    }

    /// Parse a predicate object. `null` parses to an empty condition.
    pub fn parse(spec: &serde_json::Value) -> Result<Self, QueryError> {
        let map = match spec {
            serde_json::Value::Null => return Ok(Self::new()),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(QueryError::Malformed(format!(
                    "where must be an object, got {}",
                    other
                )))
            }
        };

        let mut condition = Self::new();
        for (key, value) in map {
            let predicate = match key.as_str() {
                "OR" => Predicate::Any(parse_group("OR", value)?),
                "AND" => Predicate::All(parse_group("AND", value)?),
                field => parse_field(field, value)?,
            };
            condition.predicates.push(predicate);
        }
        Ok(condition)
    }

    /// Lower to a sea-query condition, qualifying columns with `table` if given.
    pub fn to_sea(&self, table: Option<&str>) -> sea_query::Condition {
        self.apply(sea_query::Condition::all(), table)
    }

    /// AND this condition's predicates onto an existing sea-query condition.
    pub(crate) fn apply(&self, acc: sea_query::Condition, table: Option<&str>) -> sea_query::Condition {
        self.predicates
            .iter()
            .fold(acc, |acc, p| add_predicate(acc, p, table))
    }
}

fn parse_group(key: &str, value: &serde_json::Value) -> Result<Vec<Condition>, QueryError> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::Malformed(format!("{} expects a list of conditions", key)))?;
    if items.is_empty() {
        return Err(QueryError::Malformed(format!("{} group cannot be empty", key)));
    }
    items
        .iter()
        .map(|item| {
            if !item.is_object() {
                return Err(QueryError::Malformed(format!(
                    "{} entries must be objects, got {}",
                    key, item
                )));
            }
            let condition = Condition::parse(item)?;
            if condition.is_empty() {
                return Err(QueryError::Malformed(format!("{} entries cannot be empty", key)));
            }
            Ok(condition)
        })
        .collect()
}

fn parse_field(field: &str, value: &serde_json::Value) -> Result<Predicate, QueryError> {
    if field.trim().is_empty() {
        return Err(QueryError::Malformed("empty field name in where".to_string()));
    }
    let field = field.to_string();
    match value {
        serde_json::Value::Null => Ok(Predicate::IsNull {
            field,
            negated: false,
        }),
        serde_json::Value::Array(pair) => {
            let (op, operand) = match pair.as_slice() {
                [serde_json::Value::String(op), operand] => (op.parse::<Operator>()?, operand),
                _ => {
                    return Err(QueryError::Malformed(format!(
                        "'{}' expects [operator, value], got {}",
                        field, value
                    )))
                }
            };
            match (op, operand) {
                (Operator::Eq, serde_json::Value::Null) => Ok(Predicate::IsNull {
                    field,
                    negated: false,
                }),
                (Operator::Ne, serde_json::Value::Null) => Ok(Predicate::IsNull {
                    field,
                    negated: true,
                }),
                (Operator::In | Operator::NotIn, v) if !v.is_array() => Err(QueryError::Malformed(
                    format!("'{}' {} expects a list, got {}", field, op, v),
                )),
                (Operator::Like | Operator::NotLike, v) if !v.is_string() => Err(QueryError::Malformed(
                    format!("'{}' {} expects a string pattern, got {}", field, op, v),
                )),
                (_, serde_json::Value::Object(_)) => Err(QueryError::Malformed(format!(
                    "'{}' cannot be compared with an object",
                    field
                ))),
                (op, operand) => Ok(Predicate::Compare {
                    field,
                    op,
                    value: operand.clone(),
                }),
            }
        }
        serde_json::Value::Object(_) => Err(QueryError::Malformed(format!(
            "'{}' cannot be compared with an object",
            field
        ))),
        scalar => Ok(Predicate::Compare {
            field,
            op: Operator::Eq,
            value: scalar.clone(),
        }),
    }
}

fn column(table: Option<&str>, field: &str) -> Expr {
    match table {
        Some(table) => Expr::col((Ident::new(table), Ident::new(field))),
        None => Expr::col(Ident::new(field)),
    }
}

fn compare(predicate: &Predicate, table: Option<&str>) -> Option<Expr> {
    match predicate {
        Predicate::Compare { field, op, value } => {
            let col = column(table, field);
            let expr = match op {
                Operator::Eq => col.eq(to_value(value)),
                Operator::Ne => col.ne(to_value(value)),
                Operator::Gt => col.gt(to_value(value)),
                Operator::Gte => col.gte(to_value(value)),
                Operator::Lt => col.lt(to_value(value)),
                Operator::Lte => col.lte(to_value(value)),
                Operator::Like => col.like(value.as_str().unwrap_or_default()),
                Operator::NotLike => col.not_like(value.as_str().unwrap_or_default()),
                Operator::In => col.is_in(list_values(value)),
                Operator::NotIn => col.is_not_in(list_values(value)),
            };
            Some(expr)
        }
        Predicate::IsNull { field, negated } => {
            let col = column(table, field);
            Some(if *negated { col.is_not_null() } else { col.is_null() })
        }
        Predicate::Any(_) | Predicate::All(_) => None,
    }
}

fn list_values(value: &serde_json::Value) -> Vec<sea_query::Value> {
    value
        .as_array()
        .map(|items| items.iter().map(to_value).collect())
        .unwrap_or_default()
}

fn add_predicate(acc: sea_query::Condition, predicate: &Predicate, table: Option<&str>) -> sea_query::Condition {
    if let Some(expr) = compare(predicate, table) {
        return acc.add(expr);
    }
    match predicate {
        Predicate::Any(groups) => acc.add(groups.iter().fold(sea_query::Condition::any(), |any, group| {
            add_group(any, group, table)
        })),
        Predicate::All(groups) => groups.iter().fold(acc, |all, group| add_group(all, group, table)),
        _ => acc,
    }
}

/// A single-predicate group is added bare so `OR` lists of equalities render
/// as `(a = ? OR a = ?)` rather than nested parentheses.
fn add_group(acc: sea_query::Condition, group: &Condition, table: Option<&str>) -> sea_query::Condition {
    match group.predicates.as_slice() {
        [single] => match compare(single, table) {
            Some(expr) => acc.add(expr),
            None => acc.add(group.to_sea(table)),
        },
        _ => acc.add(group.to_sea(table)),
    }
}
