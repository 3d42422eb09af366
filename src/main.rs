use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use statewire::config::{SnapshotConfig, EXAMPLE_CONFIG};
use statewire::snapshot::inspect;
use statewire::snapshot::SnapshotData;
use statewire::util;

#[derive(Parser, Debug)]
#[command(name = "statewire", version, about = "Inspect resumable state snapshots")]
struct Cli {
    /// Data directory (defaults to ~/.statewire)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to <data dir>/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one line per cell: ordinal, kind, edge count and a preview
    Inspect {
        /// Snapshot state text (the JSON embedded in the document)
        file: PathBuf,
    },
    /// Print cell counts per kind
    Stats {
        file: PathBuf,
    },
    /// Print the effective snapshot configuration
    Config {
        /// Print the bundled example config instead
        #[arg(long, action = clap::ArgAction::SetTrue)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    match cli.command {
        Command::Inspect { file } => {
            let data = read_snapshot(&file)?;
            println!("  {:>5}  {:<10} {:>3}  preview", "ord", "kind", "sub");
            for cell in inspect::describe(&data) {
                println!("{cell}");
            }
            println!("roots: {}", data.roots.join(" "));
        }
        Command::Stats { file } => {
            let data = read_snapshot(&file)?;
            for (kind, count) in inspect::kind_counts(&data) {
                println!("{kind:<10} {count}");
            }
            println!("{:<10} {}", "cells", data.objs.len());
            println!("{:<10} {}", "subscribed", data.subs.len());
            println!("{:<10} {}", "roots", data.roots.len());
        }
        Command::Config { example } => {
            if example {
                print!("{EXAMPLE_CONFIG}");
                return Ok(());
            }
            let config = match &cli.config {
                Some(path) => SnapshotConfig::load_from(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => SnapshotConfig::load(),
            };
            println!("dev_mode = {}", config.dev_mode);
            println!("long_string_threshold = {}", config.long_string_threshold);
        }
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<SnapshotData> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data = SnapshotData::parse(text.trim())
        .with_context(|| format!("{} is not snapshot state JSON", path.display()))?;
    tracing::debug!(path = %path.display(), cells = data.objs.len(), "Read snapshot");
    Ok(data)
}
