//! Checksums for migration content

use crate::migration::MigrationError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Hexadecimal SHA-256 of a migration's text.
pub fn checksum_of(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hexadecimal SHA-256 of a migration file.
///
/// Used to detect migration files edited after they were applied.
pub fn calculate_checksum(migration_file_path: &Path) -> Result<String, MigrationError> {
    let content = fs::read_to_string(migration_file_path).map_err(|e| {
        MigrationError::FileNotFound(format!("{}: {}", migration_file_path.display(), e))
    })?;
    Ok(checksum_of(&content))
}
