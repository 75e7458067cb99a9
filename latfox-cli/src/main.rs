//! latfox: add archived versions to generated FOXML files

mod report;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use latfox_core::{chain_heads, MigrationConfig, MigrationReport, Migrator, SqliteRecordStore};
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "latfox")]
#[command(author = "latfox Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Migrate LAT corpus-structure version chains into FOXML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add older versions to every FOXML object that has them
    Migrate {
        /// TOML config file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Do everything except writing output files
        #[arg(long)]
        dry_run: bool,
        /// Save the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        debug: bool,
    },

    /// Print reconstructed version chains without touching any files
    Chains {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Include objects without older versions
        #[arg(long)]
        all: bool,
    },

    /// Print the effective configuration
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("latfox=info,latfox_core=info"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<MigrationConfig> {
    match path {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(MigrationConfig::default()),
    }
}

/// Blocking part of `migrate` (runs in spawn_blocking context)
fn run_migration(config: &MigrationConfig, dry_run: bool) -> Result<MigrationReport> {
    let store = SqliteRecordStore::open(&config.database.path)
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    info!(
        "{} rows in versions table of {}",
        store.count_versions()?,
        config.database.path.display()
    );
    let migrator = Migrator::new(&store, config)?.dry_run(dry_run);
    Ok(migrator.run()?)
}

fn list_chains(config: &MigrationConfig, all: bool) -> Result<usize> {
    let store = SqliteRecordStore::open(&config.database.path)
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    let mut shown = 0;
    for chain in chain_heads(&store)? {
        if all || chain.has_history() {
            println!("{}", chain);
            shown += 1;
        }
    }
    Ok(shown)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            config,
            dry_run,
            report,
            debug,
        } => {
            init_tracing(debug);
            let config = load_config(config.as_deref())?;
            config.validate()?;

            let result = task::spawn_blocking(move || run_migration(&config, dry_run))
                .await
                .map_err(|e| anyhow!("Migration task failed: {:?}", e))??;

            print!("{}", report::format_summary(&result));
            if let Some(path) = report {
                std::fs::write(&path, result.to_json()?)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
                println!("  Report: {}", path.display());
            }
        }

        Commands::Chains { config, all } => {
            init_tracing(false);
            let config = load_config(config.as_deref())?;
            let shown = task::spawn_blocking(move || list_chains(&config, all))
                .await
                .map_err(|e| anyhow!("Chain listing task failed: {:?}", e))??;
            println!("{} chains", shown);
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
