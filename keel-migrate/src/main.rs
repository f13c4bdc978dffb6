//! keel Migration CLI Tool
//!
//! Generates migrations from a schema file and applies them to the
//! configured SQLite database.

use clap::{Parser, Subcommand};
use colored::Colorize;
use keel::config::KeelConfig;
use keel::connect;
use keel_migrate::Settings;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(about = "Migration management tool for keel schemas")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection string (`sqlite::memory:`, `sqlite://app.db`, or a path)
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Schema description (TOML)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = keel::config::DEFAULT_CONFIG_FILE)]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Show what would be applied without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations
    Down {
        /// Number of migrations to roll back
        #[arg(long, default_value = "1")]
        steps: usize,

        /// Show what would be rolled back without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check applied migrations against their files
    Validate,

    /// Generate a migration from the schema file
    Generate {
        /// Migration name (e.g., "create_blog")
        name: String,

        /// Render a Rust `Migration` module instead of an SQL file
        #[arg(long)]
        rust: bool,
    },

    /// Create missing tables and columns directly from the schema file
    Sync {
        /// Print the statements instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    dotenv::dotenv().ok();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = KeelConfig::load_from(&cli.config)?;
    let settings = Settings::resolve(config, cli.database_url, cli.migrations_dir, cli.schema);

    if let Commands::Generate { name, rust } = &cli.command {
        keel_migrate::generate(&settings, name, *rust, None)?;
        return Ok(());
    }

    let executor = connect(&settings.database_url)?;
    log::debug!("connected to {}", settings.database_url);
    match cli.command {
        Commands::Status => keel_migrate::status(&settings, &executor)?,
        Commands::Up { steps, dry_run } => {
            keel_migrate::up(&settings, &executor, steps, dry_run)?;
        }
        Commands::Down { steps, dry_run } => {
            keel_migrate::down(&settings, &executor, steps, dry_run)?;
        }
        Commands::Validate => keel_migrate::validate(&settings, &executor)?,
        Commands::Sync { dry_run } => {
            keel_migrate::sync(&settings, &executor, dry_run)?;
        }
        Commands::Generate { .. } => {}
    }
    Ok(())
}
