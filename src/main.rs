//! # hotsearch
//!
//! Harvests the trending-topic rankings published on tophub.today. Every pass
//! fetches the configured categories page by page, extracts one record per
//! ranked item, overwrites a CSV snapshot with the results and appends the
//! same rows to a SQLite log.
//!
//! ## Usage
//!
//! ```sh
//! hotsearch run                 # one pass per hour until Ctrl-C
//! hotsearch run --once          # a single pass
//! hotsearch catalog             # platform/sub-list listing of the snapshot
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: every (category, page) becomes a fragment; failures become
//!    diagnostic markers instead of aborting the pass
//! 2. **Extraction**: each fragment is parsed on its own and relative
//!    timestamps like `5分钟前` are resolved against the current time
//! 3. **Persistence**: the snapshot and the log are written independently

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod extract;
mod fetcher;
mod models;
mod outputs;
mod pipeline;
mod store;
mod utils;

use cli::{Cli, Commands};
use config::Settings;
use outputs::catalog;
use pipeline::Pipeline;
use utils::{ensure_writable_dir, format_duration};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("hotsearch starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Commands::Run(run) => {
            run.apply_to(&mut settings);
            check_output_dirs(&settings).await?;

            let pipeline = Pipeline::from_settings(&settings)?;
            if run.once {
                pipeline.run_once().await;
            } else {
                run_forever(&pipeline, Duration::from_secs(settings.interval_secs)).await;
            }
        }
        Commands::Catalog { snapshot, output } => {
            let snapshot = snapshot.unwrap_or(settings.snapshot_path);
            let pairs = catalog::write_catalog(&snapshot, &output).await?;
            info!(pairs, output = %output.display(), "Catalog complete");
        }
    }

    Ok(())
}

/// Run a pass right away and then once per `every` until Ctrl-C.
///
/// A failed pass is already logged by the pipeline; the schedule carries on.
async fn run_forever(pipeline: &Pipeline, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval = %format_duration(every), "Entering harvest loop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let t0 = std::time::Instant::now();
                let report = pipeline.run_once().await;
                if !report.snapshot.is_written() || !report.log.is_written() {
                    warn!(
                        snapshot = report.snapshot.is_written(),
                        log = report.log.is_written(),
                        "Pass finished with sink failures"
                    );
                }
                debug!(elapsed = %format_duration(t0.elapsed()), "Pass done; waiting for next tick");
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                break;
            }
        }
    }
}

/// Early check: the snapshot and report directories must be writable.
///
/// The log database's directory is left to the log sink, so a bad database
/// path only fails that sink.
async fn check_output_dirs(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let snapshot_dir = settings
        .snapshot_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty());
    for dir in snapshot_dir.into_iter().chain(settings.report_dir.as_deref()) {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }
    Ok(())
}
