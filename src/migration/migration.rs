//! Migration trait definition

use super::checksum::checksum_of;
use super::schema_manager::SchemaManager;
use crate::migration::MigrationError;

/// Trait that all migrations implement
///
/// A migration is a named, versioned unit with a forward (`up`) and a reverse
/// (`down`) schema change. Migrations run synchronously against the executor
/// borrowed by the [`SchemaManager`].
pub trait Migration: Send + Sync {
    /// Human-readable identifier, recorded in the bookkeeping table
    fn name(&self) -> &str;

    /// Version (timestamp: YYYYMMDDHHMMSS); migrations apply in ascending order
    fn version(&self) -> i64;

    /// Fingerprint of the migration's content, compared on later runs to
    /// detect edits made after the migration was applied
    fn checksum(&self) -> String {
        checksum_of(&format!("{}_{}", self.version(), self.name()))
    }

    /// Apply the migration
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;

    /// Revert the migration
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;
}
