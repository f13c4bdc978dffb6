//! Relationship specifications.

use serde::{Deserialize, Serialize};

/// Action the store takes on referencing rows when the referenced row goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

/// Cardinality and ownership direction of a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The owning model holds `foreign_key`, referencing `owner_key` on the target.
    BelongsTo {
        foreign_key: String,
        owner_key: String,
        on_delete: Option<ReferentialAction>,
    },
    /// The target holds `foreign_key`, referencing `local_key` on the owner; at most one row.
    HasOne {
        foreign_key: String,
        local_key: String,
    },
    /// The target holds `foreign_key`, referencing `local_key` on the owner.
    HasMany {
        foreign_key: String,
        local_key: String,
    },
    /// Rows are linked through a pivot table holding both keys.
    BelongsToMany {
        pivot_table: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
    },
}

/// A relationship declared on a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Normalized relation name; includes are resolved against it
    pub name: String,
    /// Normalized target model name
    pub target: String,
    pub kind: RelationKind,
}

impl RelationSpec {
    /// Whether the relation yields a list rather than a single row.
    pub fn is_to_many(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::HasMany { .. } | RelationKind::BelongsToMany { .. }
        )
    }

    /// Key under which loaded rows are attached to the parent row.
    pub fn result_key(&self) -> String {
        if self.is_to_many() {
            crate::naming::pluralize(&self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RelationKind::BelongsTo { .. } => "belongs_to",
            RelationKind::HasOne { .. } => "has_one",
            RelationKind::HasMany { .. } => "has_many",
            RelationKind::BelongsToMany { .. } => "belongs_to_many",
        }
    }
}
