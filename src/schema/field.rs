//! Field specifications.

use serde::Deserialize;

/// Semantic column type.
///
/// Each dialect maps these to vendor types in the schema compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Fixed-width textual identifier (UUID)
    Identifier,
    String,
    Text,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    Json,
}

impl FieldType {
    /// Whether a foreign key of type `self` can reference a key of type `other`.
    pub fn references(self, other: FieldType) -> bool {
        use FieldType::*;
        match (self, other) {
            (a, b) if a == b => true,
            (Integer, BigInteger) | (BigInteger, Integer) => true,
            _ => false,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, FieldType::DateTime | FieldType::Date | FieldType::Time)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::BigInteger | FieldType::Float | FieldType::Decimal
        )
    }

    pub fn is_textual(self) -> bool {
        matches!(self, FieldType::Identifier | FieldType::String | FieldType::Text)
    }
}

/// Default-value marker on a field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Store-generated UUID
    Uuid,
    CurrentTimestamp,
    /// Constant bound into the DDL as a literal
    Value(serde_json::Value),
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        match value.trim() {
            v if v.eq_ignore_ascii_case("now()") || v.eq_ignore_ascii_case("current_timestamp") => {
                DefaultValue::CurrentTimestamp
            }
            v if v.eq_ignore_ascii_case("uuid()") => DefaultValue::Uuid,
            v => DefaultValue::Value(serde_json::Value::String(v.to_string())),
        }
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::from(value.as_str())
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Value(value.into())
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Value(value.into())
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        DefaultValue::Value(value.into())
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Value(value.into())
    }
}

/// Attribute attached to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAttribute {
    PrimaryKey,
    /// Store-assigned sequential key
    AutoIncrement,
    Unique,
    Index,
    Default(DefaultValue),
    /// Refreshed with the current time whenever the row is updated
    OnUpdateCurrentTimestamp,
}

/// One column of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub attributes: Vec<FieldAttribute>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable,
            attributes: Vec::new(),
        }
    }

    pub fn has(&self, attribute: &FieldAttribute) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn is_primary_key(&self) -> bool {
        self.has(&FieldAttribute::PrimaryKey)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.has(&FieldAttribute::AutoIncrement)
    }

    pub fn is_unique(&self) -> bool {
        self.has(&FieldAttribute::Unique)
    }

    pub fn is_indexed(&self) -> bool {
        self.has(&FieldAttribute::Index)
    }

    pub fn auto_updates(&self) -> bool {
        self.has(&FieldAttribute::OnUpdateCurrentTimestamp)
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.attributes.iter().find_map(|a| match a {
            FieldAttribute::Default(d) => Some(d),
            _ => None,
        })
    }

    /// Add an attribute once; a new default replaces the previous one.
    pub(crate) fn push_attribute(&mut self, attribute: FieldAttribute) {
        if let FieldAttribute::Default(_) = attribute {
            if let Some(slot) = self
                .attributes
                .iter_mut()
                .find(|a| matches!(a, FieldAttribute::Default(_)))
            {
                *slot = attribute;
                return;
            }
        } else if self.has(&attribute) {
            return;
        }
        self.attributes.push(attribute);
    }

    /// Reason this field's attributes are inconsistent, if any.
    pub(crate) fn attribute_problem(&self) -> Option<String> {
        if self.is_primary_key() && self.nullable {
            return Some("a primary key cannot be nullable".to_string());
        }
        if self.is_auto_increment() {
            if !matches!(self.ty, FieldType::Integer | FieldType::BigInteger) {
                return Some("auto increment requires an integer column".to_string());
            }
            if !self.is_primary_key() {
                return Some("auto increment is only supported on the primary key".to_string());
            }
        }
        if self.auto_updates() && self.ty != FieldType::DateTime {
            return Some("on-update timestamp requires a datetime column".to_string());
        }
        match self.default_value() {
            Some(DefaultValue::Uuid) if self.ty != FieldType::Identifier => {
                Some("UUID() default requires an identifier column".to_string())
            }
            Some(DefaultValue::CurrentTimestamp) if !self.ty.is_temporal() => {
                Some("current-timestamp default requires a temporal column".to_string())
            }
            Some(DefaultValue::Value(v)) => literal_problem(self.ty, v),
            _ => None,
        }
    }
}

fn literal_problem(ty: FieldType, value: &serde_json::Value) -> Option<String> {
    let fits = match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(_) => ty == FieldType::Boolean,
        serde_json::Value::Number(n) => match ty {
            FieldType::Integer | FieldType::BigInteger => n.is_i64() || n.is_u64(),
            FieldType::Float | FieldType::Decimal => true,
            FieldType::Boolean => matches!(n.as_i64(), Some(0) | Some(1)),
            _ => false,
        },
        serde_json::Value::String(_) => ty.is_textual() || ty.is_temporal() || ty == FieldType::Decimal,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => ty == FieldType::Json,
    };
    if fits {
        None
    } else {
        Some(format!("default {} does not fit a {:?} column", value, ty))
    }
}
