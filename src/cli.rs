//! Command-line interface definitions for hotsearch.
//!
//! Flags override whatever the config file sets. Paths that tend to differ
//! per deployment can also come from environment variables.

use crate::config::Settings;
use crate::fetcher::FetchStrategy;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for hotsearch.
///
/// # Examples
///
/// ```sh
/// # Harvest every hour with the built-in category table
/// hotsearch run
///
/// # One pass, sequential fetching, custom log database
/// hotsearch run --once --strategy sequential -d /var/lib/hotsearch.sqlite
///
/// # List every platform/sub-list pair in the current snapshot
/// hotsearch catalog -o Directory.txt
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true, env = "HOTSEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest every category and persist the results
    Run(RunArgs),

    /// Write the sorted platform/sub-list listing of a snapshot
    Catalog {
        /// Snapshot to read (defaults to the configured snapshot path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Listing destination
        #[arg(short, long, default_value = "Directory.txt")]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between passes when running continuously
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Page fetch strategy
    #[arg(long, value_enum)]
    pub strategy: Option<FetchStrategy>,

    /// Snapshot file, overwritten every pass
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// SQLite database holding the append-only log
    #[arg(short, long, env = "HOTSEARCH_DATABASE")]
    pub database: Option<PathBuf>,

    /// Log table name
    #[arg(short, long)]
    pub table: Option<String>,

    /// Directory for per-run JSON reports
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Overlay the flags that were given onto `settings`.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(secs) = self.interval_secs {
            settings.interval_secs = secs;
        }
        if let Some(strategy) = self.strategy {
            settings.strategy = strategy;
        }
        if let Some(path) = &self.snapshot {
            settings.snapshot_path = path.clone();
        }
        if let Some(db) = &self.database {
            settings.database = db.clone();
        }
        if let Some(table) = &self.table {
            settings.table = table.clone();
        }
        if let Some(dir) = &self.report_dir {
            settings.report_dir = Some(dir.clone());
        }
    }
}
