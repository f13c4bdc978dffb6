//! Command implementations for the `keel-migrate` binary.
//!
//! Each handler takes resolved [`Settings`] and an open executor so it can be
//! driven from tests without going through argument parsing.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use keel::config::KeelConfig;
use keel::migration::{compile, generate_migration_source, migration_file_name, version_now, Migrator, SchemaManager};
use keel::schema::{load_schema, Schema};
use keel::{Dialect, Executor};
use std::fs;
use std::path::PathBuf;

/// Effective settings after merging config file, environment and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub migrations_dir: PathBuf,
    pub schema_path: PathBuf,
    pub table: String,
    pub dialect: Dialect,
}

impl Settings {
    /// Flags win over `KEEL_DATABASE_URL`/`DATABASE_URL`, which win over the
    /// config file.
    pub fn resolve(
        config: KeelConfig,
        database_url: Option<String>,
        migrations_dir: Option<PathBuf>,
        schema_path: Option<PathBuf>,
    ) -> Self {
        let database_url = database_url
            .or_else(|| std::env::var("KEEL_DATABASE_URL").ok())
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(config.database.url);
        Self {
            database_url,
            migrations_dir: migrations_dir.unwrap_or(config.migrations.dir),
            schema_path: schema_path.unwrap_or(config.schema.path),
            table: config.migrations.table,
            dialect: config.database.dialect,
        }
    }

    pub fn migrator(&self) -> Result<Migrator> {
        if !self.migrations_dir.exists() {
            log::debug!("migrations directory {} does not exist yet", self.migrations_dir.display());
            return Ok(Migrator::new().with_table(self.table.clone()));
        }
        let migrator = Migrator::from_dir(&self.migrations_dir)
            .with_context(|| format!("loading migrations from {}", self.migrations_dir.display()))?;
        Ok(migrator.with_table(self.table.clone()))
    }

    pub fn schema(&self) -> Result<Schema> {
        load_schema(&self.schema_path).with_context(|| format!("loading schema {}", self.schema_path.display()))
    }
}

pub fn status(settings: &Settings, executor: &dyn Executor) -> Result<()> {
    let status = settings.migrator()?.status(executor)?;

    println!("\n{}\n", "Migration Status".bold());
    if status.applied.is_empty() {
        println!("Applied: none");
    } else {
        println!("Applied ({}):", status.applied.len());
        for record in &status.applied {
            let time = record
                .execution_time_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "N/A".to_string());
            println!(
                "  {} m{}_{} ({}, {})",
                "✓".green(),
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time
            );
        }
    }

    println!();
    if status.pending.is_empty() {
        println!("Pending: none");
    } else {
        println!("Pending ({}):", status.pending.len());
        for pending in &status.pending {
            println!("  {} m{}_{}", "…".yellow(), pending.version, pending.name);
        }
    }

    for drift in &status.drifted {
        println!(
            "  {} m{}_{} changed since it was applied (stored {}, current {})",
            "!".red(),
            drift.version,
            drift.name,
            drift.stored,
            drift.current
        );
    }
    for record in &status.missing {
        println!("  {} m{}_{} is applied but has no file", "!".red(), record.version, record.name);
    }

    println!(
        "\nSummary: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    );
    Ok(())
}

pub fn up(settings: &Settings, executor: &dyn Executor, steps: Option<usize>, dry_run: bool) -> Result<usize> {
    let migrator = settings.migrator()?;
    if dry_run {
        let status = migrator.validate(executor)?;
        let pending: Vec<_> = status.pending.iter().take(steps.unwrap_or(usize::MAX)).collect();
        if pending.is_empty() {
            println!("No pending migrations to apply");
        } else {
            println!("Would apply {} migration(s):", pending.len());
            for (i, migration) in pending.iter().enumerate() {
                println!("  {}. m{}_{}", i + 1, migration.version, migration.name);
            }
        }
        return Ok(0);
    }

    let applied = migrator.up(executor, steps)?;
    if applied > 0 {
        println!("{} applied {} migration(s)", "✓".green(), applied);
    } else {
        println!("No migrations to apply");
    }
    Ok(applied)
}

pub fn down(settings: &Settings, executor: &dyn Executor, steps: usize, dry_run: bool) -> Result<usize> {
    let migrator = settings.migrator()?;
    if dry_run {
        let status = migrator.validate(executor)?;
        let targets: Vec<_> = status.applied.iter().rev().take(steps).collect();
        if targets.is_empty() {
            println!("No applied migrations to roll back");
        } else {
            println!("Would roll back {} migration(s):", targets.len());
            for (i, record) in targets.iter().enumerate() {
                println!("  {}. m{}_{}", i + 1, record.version, record.name);
            }
        }
        return Ok(0);
    }

    let reverted = migrator.down(executor, Some(steps))?;
    if reverted > 0 {
        println!("{} rolled back {} migration(s)", "✓".green(), reverted);
    } else {
        println!("No migrations to roll back");
    }
    Ok(reverted)
}

pub fn validate(settings: &Settings, executor: &dyn Executor) -> Result<()> {
    let status = settings.migrator()?.validate(executor)?;
    println!("{} {} applied migration(s) match their files", "✓".green(), status.applied.len());
    Ok(())
}

/// Write a migration for the configured schema into the migrations
/// directory and return its path. `rust` renders a `Migration` module instead
/// of an SQL file.
pub fn generate(settings: &Settings, name: &str, rust: bool, version: Option<i64>) -> Result<PathBuf> {
    let schema = settings.schema()?;
    let version = version.unwrap_or_else(version_now);
    fs::create_dir_all(&settings.migrations_dir)
        .with_context(|| format!("creating {}", settings.migrations_dir.display()))?;

    let (file_name, contents) = if rust {
        (
            migration_file_name(version, name, "rs"),
            generate_migration_source(&schema, settings.dialect, name, version)?,
        )
    } else {
        let compiled = compile(&schema, settings.dialect)?.named(name, version);
        (migration_file_name(version, name, "sql"), compiled.to_sql())
    };

    let path = settings.migrations_dir.join(file_name);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    println!("{} generated {}", "✓".green(), path.display());
    Ok(path)
}

/// Bring the database in line with the schema file without recording a
/// migration. Returns the number of statements run (or planned).
pub fn sync(settings: &Settings, executor: &dyn Executor, dry_run: bool) -> Result<usize> {
    let schema = settings.schema()?;
    let manager = SchemaManager::new(executor);
    if dry_run {
        let plan = manager.plan_sync(&schema)?;
        for statement in &plan {
            println!("{};", statement);
        }
        return Ok(plan.len());
    }
    let executed = manager.sync(&schema)?;
    if executed == 0 {
        println!("Schema already up to date");
    } else {
        println!("{} executed {} statement(s)", "✓".green(), executed);
    }
    Ok(executed)
}

