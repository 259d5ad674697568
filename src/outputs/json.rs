//! JSON run reports.
//!
//! When a report directory is configured, every run leaves a record of what
//! it fetched and how each sink fared:
//!
//! ```text
//! report_dir/
//! └── 2024-05-20/
//!     ├── 080000.json
//!     └── 090000.json
//! ```

use crate::models::RunReport;
use chrono::Local;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `report` to `{report_dir}/{date}/{HHMMSS}.json` and return the path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir.display()))]
pub async fn write_report(report: &RunReport, report_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let now = Local::now();
    let full_dir = report_dir.join(now.date_naive().to_string());

    if let Err(e) = fs::create_dir_all(&full_dir).await {
        error!(dir = %full_dir.display(), error = %e, "Failed to create report dir");
        return Err(e.into());
    }

    let path = full_dir.join(format!("{}.json", now.format("%H%M%S")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");

    Ok(path)
}
