//! Migration file discovery and parsing

use super::checksum::checksum_of;
use super::migration::Migration;
use super::schema_manager::SchemaManager;
use crate::migration::MigrationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^m(\d{14})_(.+)\.(sql|rs)$").unwrap_or_else(|e| panic!("invalid migration file pattern: {e}"))
});

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// How a migration file is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// Plain SQL with `-- migrate:up` / `-- migrate:down` sections, loaded at runtime
    Sql,
    /// Rust module compiled into the application and registered explicitly
    Rust,
}

/// Represents a discovered migration file
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFile {
    pub path: PathBuf,
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    pub kind: MigrationKind,
}

impl MigrationFile {
    /// Parse migration file name to extract version, name and kind
    ///
    /// Expected format: `m{YYYYMMDDHHMMSS}_{name}.sql` or `.rs`, e.g.
    /// `m20240120120000_create_users_table.sql` has version 20240120120000
    /// and name "create_users_table".
    pub fn parse_filename(filename: &str) -> Result<(i64, String, MigrationKind), MigrationError> {
        let caps = FILE_NAME.captures(filename).ok_or_else(|| {
            MigrationError::InvalidFormat(format!(
                "Migration file name '{}' does not match expected pattern: m{{YYYYMMDDHHMMSS}}_{{name}}.sql",
                filename
            ))
        })?;

        let version = caps[1]
            .parse::<i64>()
            .map_err(|e| MigrationError::InvalidFormat(format!("bad version in '{}': {}", filename, e)))?;
        let kind = if &caps[3] == "sql" {
            MigrationKind::Sql
        } else {
            MigrationKind::Rust
        };
        Ok((version, caps[2].to_string(), kind))
    }
}

/// Discover all migration files in a directory, sorted by version (oldest first).
///
/// Files that do not look like migrations (`mod.rs`, READMEs) are skipped.
///
/// # Errors
///
/// Returns `FileNotFound` when the directory is missing or unreadable.
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    if !migrations_dir.is_dir() {
        return Err(MigrationError::FileNotFound(migrations_dir.display().to_string()));
    }

    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        MigrationError::FileNotFound(format!(
            "Failed to read migrations directory {}: {}",
            migrations_dir.display(),
            e
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| MigrationError::FileNotFound(format!("Failed to read directory entry: {}", e)))?
            .path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !FILE_NAME.is_match(filename) {
            log::debug!("Skipping non-migration file {}", path.display());
            continue;
        }
        let (version, name, kind) = MigrationFile::parse_filename(filename)?;
        migrations.push(MigrationFile { path, version, name, kind });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// A migration loaded from a `.sql` file.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlMigration {
    pub version: i64,
    pub name: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
    checksum: String,
}

impl SqlMigration {
    /// Parse migration text. Statements before the first marker belong to `up`.
    pub fn parse(version: i64, name: &str, content: &str) -> Result<Self, MigrationError> {
        let (up, down) = match content.find(DOWN_MARKER) {
            Some(at) => (&content[..at], &content[at + DOWN_MARKER.len()..]),
            None => (content, ""),
        };
        let up = up.replacen(UP_MARKER, "", 1);

        let up = split_statements(&up);
        if up.is_empty() {
            return Err(MigrationError::InvalidFormat(format!(
                "migration {}_{} has no up statements",
                version, name
            )));
        }
        Ok(Self {
            version,
            name: name.to_string(),
            up,
            down: split_statements(down),
            checksum: checksum_of(content),
        })
    }

    pub fn load(file: &MigrationFile) -> Result<Self, MigrationError> {
        let content = fs::read_to_string(&file.path)
            .map_err(|e| MigrationError::FileNotFound(format!("{}: {}", file.path.display(), e)))?;
        Self::parse(file.version, &file.name, &content)
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn checksum(&self) -> String {
        self.checksum.clone()
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute_all(&self.up)
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute_all(&self.down)
    }
}

/// Split SQL text on `;`, ignoring semicolons inside quotes and `--` comments.
/// Comment-only fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), _) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            (None, '\'' | '"' | '`') => {
                quote = Some(c);
                has_code = true;
                current.push(c);
            }
            (None, '-') if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            (None, ';') => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
            }
            (None, _) => {
                has_code |= !c.is_whitespace();
                current.push(c);
            }
        }
    }
    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}
