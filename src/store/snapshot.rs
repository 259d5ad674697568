//! Snapshot sink: the latest run as a CSV file.
//!
//! The header is `title,link,hotcount,platform,slist,rectime`. The file is
//! written next to the target and renamed over it, so readers see either the
//! previous snapshot or the new one, never a mix.

use super::PersistenceError;
use crate::models::RankingEntry;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Replace the snapshot at `path` with `entries`.
///
/// # Arguments
///
/// * `entries` - Rows of this run; an empty slice leaves a header-only file
/// * `path` - Snapshot location; parent directories are created
///
/// # Returns
///
/// The number of rows written, or [`PersistenceError::Snapshot`].
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = entries.len()))]
pub fn persist(entries: &[RankingEntry], path: &Path) -> Result<usize, PersistenceError> {
    let fail = |source: Box<dyn std::error::Error + Send + Sync>| PersistenceError::Snapshot {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| fail(e.into()))?;
    }

    let tmp = tmp_path(path);
    let written = write_csv(entries, &tmp).and_then(|()| fs::rename(&tmp, path).map_err(Into::into));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(fail(e));
    }

    info!("Wrote snapshot");
    Ok(entries.len())
}

fn write_csv(
    entries: &[RankingEntry],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut writer = csv::Writer::from_path(path)?;
    if entries.is_empty() {
        // serde only emits the header alongside the first record
        writer.write_record(["title", "link", "hotcount", "platform", "slist", "rectime"])?;
    }
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read a snapshot back.
pub fn read(path: &Path) -> Result<Vec<RankingEntry>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> RankingEntry {
        RankingEntry {
            title: title.to_string(),
            link: format!("https://tophub.today/{title}"),
            hotcount: "1万".to_string(),
            platform: "知乎".to_string(),
            slist: String::new(),
            rectime: String::new(),
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.csv");
        persist(&[entry("a"), entry("b, with comma")], &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("title,link,hotcount,platform,slist,rectime\n"));
        assert_eq!(read(&path).unwrap(), vec![entry("a"), entry("b, with comma")]);
    }

    #[test]
    fn test_second_persist_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/snap.csv");
        persist(&[entry("a1"), entry("a2"), entry("a3")], &path).unwrap();
        persist(&[entry("b1")], &path).unwrap();

        assert_eq!(read(&path).unwrap(), vec![entry("b1")]);
        assert!(!dir.path().join("nested/snap.csv.tmp").exists());
    }

    #[test]
    fn test_empty_run_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.csv");
        persist(&[entry("a")], &path).unwrap();
        assert_eq!(persist(&[], &path).unwrap(), 0);
        assert!(read(&path).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "title,link,hotcount,platform,slist,rectime\n"
        );
    }

    #[test]
    fn test_unwritable_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // the target is an existing directory, so the rename fails
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();
        assert!(matches!(
            persist(&[entry("a")], &path),
            Err(PersistenceError::Snapshot { .. })
        ));
    }
}
