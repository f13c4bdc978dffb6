//! Migration status tracking

use crate::migration::MigrationRecord;

/// Migration status information
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Applied migrations that are still known to the migrator
    pub applied: Vec<MigrationRecord>,
    /// Known migrations not yet applied, oldest first
    pub pending: Vec<PendingMigration>,
    /// Applied migrations whose content changed since they were applied
    pub drifted: Vec<ChecksumDrift>,
    /// Applied migrations the migrator no longer knows about
    pub missing: Vec<MigrationRecord>,
}

/// Represents a pending migration (not yet applied)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

/// An applied migration whose stored checksum no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDrift {
    pub version: i64,
    pub name: String,
    pub stored: String,
    pub current: String,
}

impl MigrationStatus {
    pub fn total(&self) -> usize {
        self.applied.len() + self.pending.len()
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether applying further migrations is safe
    pub fn is_consistent(&self) -> bool {
        self.drifted.is_empty() && self.missing.is_empty()
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
