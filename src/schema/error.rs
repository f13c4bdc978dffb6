//! Schema errors. All of them are fatal: nothing is compiled or emitted.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Foreign keys form a cycle; the tables cannot be created in any order.
    #[error("Circular dependency detected among tables: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("model '{model}' declares relation '{relation}' to undeclared model '{target}'")]
    UnknownModel {
        model: String,
        relation: String,
        target: String,
    },

    #[error("invalid attribute on '{model}.{field}': {reason}")]
    InvalidAttribute {
        model: String,
        field: String,
        reason: String,
    },

    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("field '{field}' is declared more than once on model '{model}'")]
    DuplicateField { model: String, field: String },

    #[error("relation '{relation}' is declared more than once on model '{model}'")]
    DuplicateRelation { model: String, relation: String },

    #[error("model '{0}' has no primary key")]
    MissingPrimaryKey(String),

    #[error("model '{model}' has more than one primary key")]
    MultiplePrimaryKeys { model: String },

    /// A relation names a key column that the model holding it does not declare.
    #[error("relation '{relation}' on '{model}' needs field '{field}' on model '{holder}'")]
    MissingKey {
        model: String,
        relation: String,
        holder: String,
        field: String,
    },

    #[error("foreign key '{model}.{field}' is {found:?} but references a {expected:?} key")]
    ForeignKeyTypeMismatch {
        model: String,
        field: String,
        expected: crate::schema::FieldType,
        found: crate::schema::FieldType,
    },

    #[error("pivot table '{pivot}' is declared inconsistently: {reason}")]
    PivotConflict { pivot: String, reason: String },

    /// A builder method that targets the previous field or relation had none to act on.
    #[error("model '{model}': {reason}")]
    InvalidDefinition { model: String, reason: String },

    #[error("failed to read schema file: {0}")]
    File(String),
}
