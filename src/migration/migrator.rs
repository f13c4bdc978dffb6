//! Migrator - Core migration execution engine

use crate::config::default_migrations_table;
use crate::executor::Executor;
use crate::migration::file::{discover_migrations, MigrationKind, SqlMigration};
use crate::migration::state_table::{initialize_state_table, query_applied, record_migration, remove_migration_record};
use crate::migration::{
    ChecksumDrift, Migration, MigrationError, MigrationRecord, MigrationStatus, PendingMigration, SchemaManager,
};
use crate::transaction::TransactionGuard;
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Core migration execution engine
///
/// The `Migrator` holds an explicit, version-ordered list of migrations and
/// reconciles it with the state table. Each migration runs in its own
/// transaction together with its bookkeeping row, so a failed migration leaves
/// neither partial changes (where the store supports transactional DDL) nor a
/// record behind.
///
/// ```no_run
/// use keel::migration::Migrator;
/// use keel::SqliteExecutor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = SqliteExecutor::open("app.db")?;
/// let migrator = Migrator::from_dir("migrations")?;
/// let applied = migrator.up(&executor, None)?;
/// println!("applied {applied} migration(s)");
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
    /// Versions of compiled-in migration files found on disk but not registered here
    external: HashSet<i64>,
    table: String,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
            external: HashSet::new(),
            table: default_migrations_table(),
        }
    }

    /// Load every `.sql` migration in `migrations_dir`.
    ///
    /// `.rs` migrations are compiled into the application and must be
    /// registered with [`Migrator::add`]; until then they are only tracked so
    /// their applied records are not reported as missing.
    pub fn from_dir(migrations_dir: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let mut migrator = Self::new();
        for file in discover_migrations(migrations_dir.as_ref())? {
            match file.kind {
                MigrationKind::Sql => migrator.register(Box::new(SqlMigration::load(&file)?))?,
                MigrationKind::Rust => {
                    log::debug!("Found compiled migration {}; it must be registered explicitly", file.path.display());
                    migrator.external.insert(file.version);
                }
            }
        }
        Ok(migrator)
    }

    /// Use a different state table (default `keel_migrations`)
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a migration, keeping the list ordered by version
    pub fn add(mut self, migration: Box<dyn Migration>) -> Result<Self, MigrationError> {
        self.register(migration)?;
        Ok(self)
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
        if let Some(existing) = self.find(migration.version()) {
            return Err(MigrationError::DuplicateVersion {
                version: migration.version(),
                first: existing.name().to_string(),
                second: migration.name().to_string(),
            });
        }
        self.external.remove(&migration.version());
        let at = self.migrations.partition_point(|m| m.version() < migration.version());
        self.migrations.insert(at, migration);
        Ok(())
    }

    pub fn migrations(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref())
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.migrations().find(|m| m.version() == version)
    }

    /// Compare the known migrations with the state table.
    ///
    /// Checksum drift and missing migrations are reported, not raised; see
    /// [`Migrator::validate`].
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor, &self.table)?;
        let records = query_applied(executor, &self.table)?;
        let mut status = MigrationStatus::default();

        for migration in self.migrations() {
            let checksum = migration.checksum();
            match records.iter().find(|r| r.version == migration.version()) {
                Some(record) => {
                    if record.checksum != checksum {
                        status.drifted.push(ChecksumDrift {
                            version: record.version,
                            name: record.name.clone(),
                            stored: record.checksum.clone(),
                            current: checksum,
                        });
                    }
                    status.applied.push(record.clone());
                }
                None => status.pending.push(PendingMigration {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    checksum,
                }),
            }
        }

        for record in records {
            if self.find(record.version).is_none() {
                if self.external.contains(&record.version) {
                    status.applied.push(record);
                } else {
                    status.missing.push(record);
                }
            }
        }
        status.applied.sort_by_key(|r| r.version);
        Ok(status)
    }

    /// Fail if any applied migration changed or disappeared
    pub fn validate(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        let status = self.status(executor)?;
        ensure_consistent(&status)?;
        Ok(status)
    }

    /// Apply pending migrations, oldest first.
    ///
    /// # Arguments
    ///
    /// * `steps` - Number of migrations to apply (None = all pending)
    ///
    /// # Returns
    ///
    /// Returns the number of migrations applied.
    pub fn up(&self, executor: &dyn Executor, steps: Option<usize>) -> Result<usize, MigrationError> {
        let status = self.validate(executor)?;
        let pending: Vec<&dyn Migration> = status
            .pending
            .iter()
            .take(steps.unwrap_or(usize::MAX))
            .filter_map(|p| self.find(p.version))
            .collect();

        for migration in &pending {
            self.run(executor, *migration, Direction::Up)?;
        }
        if pending.is_empty() {
            log::info!("No pending migrations");
        }
        Ok(pending.len())
    }

    /// Roll back applied migrations, newest first.
    ///
    /// # Arguments
    ///
    /// * `steps` - Number of migrations to roll back (default: 1)
    pub fn down(&self, executor: &dyn Executor, steps: Option<usize>) -> Result<usize, MigrationError> {
        let status = self.validate(executor)?;
        let targets: Vec<&MigrationRecord> = status.applied.iter().rev().take(steps.unwrap_or(1)).collect();

        for record in &targets {
            let migration = self.find(record.version).ok_or_else(|| MigrationError::MissingFile {
                version: record.version,
                name: record.name.clone(),
            })?;
            self.run(executor, migration, Direction::Down)?;
        }
        Ok(targets.len())
    }

    fn run(&self, executor: &dyn Executor, migration: &dyn Migration, direction: Direction) -> Result<(), MigrationError> {
        let (version, name) = (migration.version(), migration.name());

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::apply_migration_span(name, version).entered();

        log::info!(
            "{} migration {} ({})",
            if direction == Direction::Up { "Applying" } else { "Reverting" },
            name,
            version
        );
        let start = Instant::now();
        let guard = TransactionGuard::begin(executor)?;
        let manager = SchemaManager::new(executor);

        let outcome = match direction {
            Direction::Up => migration.up(&manager).and_then(|()| {
                let record = MigrationRecord::new(
                    version,
                    name.to_string(),
                    migration.checksum(),
                    Utc::now(),
                    Some(start.elapsed().as_millis() as i64),
                    true,
                );
                record_migration(executor, &self.table, &record)
            }),
            Direction::Down => migration
                .down(&manager)
                .and_then(|()| remove_migration_record(executor, &self.table, version)),
        };

        match outcome {
            Ok(()) => {
                guard.commit()?;
                log::info!("Migration {} finished in {} ms", name, start.elapsed().as_millis());
                Ok(())
            }
            Err(error) => {
                if let Err(rollback) = guard.rollback() {
                    log::error!("Rollback of migration {} failed: {}", name, rollback);
                }
                log::error!("Migration {} failed: {}", name, error);
                Err(MigrationError::ExecutionFailed {
                    version,
                    name: name.to_string(),
                    error: error.to_string(),
                })
            }
        }
    }
}

fn ensure_consistent(status: &MigrationStatus) -> Result<(), MigrationError> {
    if let Some(drift) = status.drifted.first() {
        return Err(MigrationError::ChecksumMismatch {
            version: drift.version,
            name: drift.name.clone(),
            stored: drift.stored.clone(),
            current: drift.current.clone(),
        });
    }
    if let Some(record) = status.missing.first() {
        return Err(MigrationError::MissingFile {
            version: record.version,
            name: record.name.clone(),
        });
    }
    Ok(())
}
