//! Catalog of platform/sub-list pairs.
//!
//! Reads a snapshot and writes one `platform,slist` line per distinct pair,
//! sorted by platform and then sub-list. Groups without a sub-list show up
//! as `platform,`.

use crate::models::RankingEntry;
use crate::store::snapshot;
use itertools::Itertools;
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Distinct `(platform, slist)` pairs, sorted.
pub fn catalog_pairs(entries: &[RankingEntry]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|e| (e.platform.clone(), e.slist.clone()))
        .unique()
        .sorted()
        .collect()
}

pub fn render(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (platform, slist) in pairs {
        // writing into a String cannot fail
        let _ = writeln!(out, "{platform},{slist}");
    }
    out
}

/// Build the listing for the snapshot at `snapshot_path` into `output`.
#[instrument(level = "info", skip_all, fields(snapshot = %snapshot_path.display(), output = %output.display()))]
pub async fn write_catalog(snapshot_path: &Path, output: &Path) -> Result<usize, Box<dyn Error>> {
    let entries = snapshot::read(snapshot_path)?;
    let pairs = catalog_pairs(&entries);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(output, render(&pairs)).await?;

    info!(pairs = pairs.len(), entries = entries.len(), "Wrote catalog");
    Ok(pairs.len())
}
