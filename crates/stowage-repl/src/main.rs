use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stowage_repl::failure::{FailureStore, MemoryFailureStore};
use stowage_repl::tracking::{MemoryTrackingStore, TrackingStore};
use stowage_repl::ReplicationConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "stowage-repl")]
#[command(about = "Stowage replication engine tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate a configuration file, then print the resolved settings.
    CheckConfig { file: PathBuf },
    /// Print the default configuration as TOML.
    ShowDefaults,
    /// List failure records from a store snapshot.
    Failures {
        snapshot: PathBuf,
        #[arg(short, long)]
        task: Option<String>,
    },
    /// List federation tracking records from a store snapshot.
    Tracking { snapshot: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::CheckConfig { file } => {
            let config = ReplicationConfig::from_file(&file)?;
            tracing::info!(path = %file.display(), "configuration valid");
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Command::ShowDefaults => {
            print!("{}", toml::to_string_pretty(&ReplicationConfig::default())?);
        }
        Command::Failures { snapshot, task } => {
            let store = MemoryFailureStore::restore(&snapshot)
                .with_context(|| format!("reading {}", snapshot.display()))?;
            let mut records = store.list()?;
            records.retain(|r| task.as_deref().map_or(true, |t| r.task_key == t));
            records.sort_by_key(|r| r.created_at);
            for r in records {
                println!(
                    "{}\t{}\t{:?}\tretries={}\tretrying={}\t{}",
                    r.id, r.task_key, r.object, r.retry_count, r.retrying, r.failure_reason
                );
            }
        }
        Command::Tracking { snapshot } => {
            let store = MemoryTrackingStore::restore(&snapshot)
                .with_context(|| format!("reading {}", snapshot.display()))?;
            let mut records = store.list()?;
            records.sort_by_key(|r| r.created_at);
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}\tretries={}\t{}",
                    r.id,
                    r.task_key,
                    r.remote_cluster_id,
                    r.node_path,
                    r.retry_count,
                    r.failure_reason.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
