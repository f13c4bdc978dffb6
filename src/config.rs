//! Configuration loading.
//!
//! [`KeelConfig::load`] reads `config/keel.toml` (optional) and overlays
//! `KEEL__*` environment variables, e.g. `KEEL__DATABASE__URL=app.db`.

use crate::executor::Dialect;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config/keel.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KeelConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_dialect")]
    pub dialect: Dialect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,
    /// Bookkeeping table recording applied migrations
    #[serde(default = "default_migrations_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,
}

fn default_db_url() -> String {
    "keel.db".to_string()
}

fn default_dialect() -> Dialect {
    Dialect::Sqlite
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

pub(crate) fn default_migrations_table() -> String {
    "keel_migrations".to_string()
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.toml")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            dialect: default_dialect(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            table: default_migrations_table(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
        }
    }
}

impl KeelConfig {
    /// Load from `config/keel.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file (optional) plus `KEEL__*` env vars.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("KEEL").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // Unreadable file: warn and retry with env only
                log::warn!("failed to load config file {}, falling back to env: {}", path, err);
                Config::builder()
                    .add_source(Environment::with_prefix("KEEL").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<KeelConfig>()
    }
}
