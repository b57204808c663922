use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use kb_lifecycle::lifecycle::{read_bundle_entries, RetentionPolicy, Shutdown};
use kb_lifecycle::{LifecycleConfig, LifecycleManager, LocalStore};

#[derive(Parser)]
#[command(name = "kb-lifecycle", version, about = "Knowledge store lifecycle and archival tooling")]
struct Cli {
    /// Root directory of the knowledge store
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// JSON config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inventory the corpus folders
    Stats {
        /// Age in days past which objects are reported as aged
        #[arg(long)]
        archive_days: Option<u32>,
    },
    /// Bundle archivable objects and remove them from the hot tier
    Archive {
        #[arg(long)]
        archive_days: Option<u32>,
        #[arg(long)]
        delete_days: Option<u32>,
    },
    /// Delete corpus objects at least DAYS old
    DeleteOld {
        #[arg(long)]
        days: u32,
    },
    /// Find duplicate processed records and remove them
    Dedupe {
        /// Only report duplicates
        #[arg(long)]
        dry_run: bool,
    },
    /// Export the whole corpus into one bundle
    Export,
    /// List archive bundles, newest first
    ListArchives,
    /// List the entries of a stored bundle
    Contents { bundle_path: String },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LifecycleConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => LifecycleConfig::default(),
    };

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current object");
            signal.trigger();
        }
    });

    let store = Arc::new(LocalStore::new(&cli.root));
    let defaults = config.retention;
    let manager = LifecycleManager::with_shutdown(store, config, shutdown)
        .context("initialise lifecycle manager")?;
    info!("knowledge store at {}", cli.root.display());

    match cli.command {
        Commands::Stats { archive_days } => {
            let policy = policy_from(defaults, archive_days, None)?;
            print_json(&manager.get_storage_stats(&policy).await?)
        }
        Commands::Archive {
            archive_days,
            delete_days,
        } => {
            let policy = policy_from(defaults, archive_days, delete_days)?;
            print_json(&manager.archive_old_data(&policy).await?)
        }
        Commands::DeleteOld { days } => print_json(&manager.delete_old_data(days).await?),
        Commands::Dedupe { dry_run } => {
            if dry_run {
                print_json(&manager.find_duplicates().await?)
            } else {
                print_json(&manager.remove_duplicates().await?)
            }
        }
        Commands::Export => print_json(&manager.export_all_data().await?),
        Commands::ListArchives => print_json(&manager.list_archives().await?),
        Commands::Contents { bundle_path } => {
            let bytes = manager
                .read_bundle(&bundle_path)
                .await
                .with_context(|| format!("read bundle {bundle_path}"))?;
            print_json(&read_bundle_entries(&bytes)?)
        }
    }
}

fn policy_from(
    defaults: RetentionPolicy,
    archive_days: Option<u32>,
    delete_days: Option<u32>,
) -> Result<RetentionPolicy> {
    let policy = RetentionPolicy::new(
        archive_days.unwrap_or(defaults.archive_threshold_days),
        delete_days.unwrap_or(defaults.deletion_threshold_days),
    )?;
    Ok(policy)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
