//! One harvest pass: fetch → extract → snapshot + log.
//!
//! [`Pipeline::run_once`] never fails. Fetch problems end up as diagnostic
//! fragments, bad timestamps as empty `rectime`s, and sink failures as
//! [`SinkOutcome::Failed`] in the returned [`RunReport`]. The snapshot and the
//! log are written independently, so one failing does not stop the other.

use crate::config::{ConfigError, Settings};
use crate::extract::Extractor;
use crate::fetcher::{FetchError, FetchStrategy, Fetcher, Fragment};
use crate::models::{RECTIME_FORMAT, RankingEntry, RunReport, SinkOutcome};
use crate::outputs::json;
use crate::store::{self, PersistenceError};
use crate::utils::truncate_for_log;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug)]
pub struct Pipeline {
    fetcher: Fetcher,
    extractor: Extractor,
    strategy: FetchStrategy,
    snapshot_path: PathBuf,
    database: PathBuf,
    table: String,
    report_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Build the fetcher, extractor and sink locations from `settings`.
    ///
    /// Fails only on an invalid category table, origin or HTTP client setup.
    pub fn from_settings(settings: &Settings) -> Result<Self, SetupError> {
        let spec = settings.category_spec()?;
        let extractor = Extractor::new(settings.origin_url()?);
        let fetcher = Fetcher::from_settings(spec, settings)?;
        Ok(Self {
            fetcher,
            extractor,
            strategy: settings.strategy,
            snapshot_path: settings.snapshot_path.clone(),
            database: settings.database.clone(),
            table: settings.table.clone(),
            report_dir: settings.report_dir.clone(),
        })
    }

    /// Run one full harvest pass.
    ///
    /// Fetches every category, extracts the entries, then writes the snapshot
    /// and appends to the log. Each step degrades instead of failing, so the
    /// pass always completes.
    ///
    /// # Returns
    ///
    /// A [`RunReport`] with fragment and entry counts and the outcome of each
    /// sink. When a report directory is configured the same report is also
    /// written there as JSON.
    #[instrument(level = "info", skip_all, fields(strategy = ?self.strategy))]
    pub async fn run_once(&self) -> RunReport {
        let started_at = Local::now().format(RECTIME_FORMAT).to_string();
        let t0 = std::time::Instant::now();

        let blob = self.fetcher.fetch_all(self.strategy).await;
        for marker in diagnostics(blob.fragments()) {
            warn!(marker = %truncate_for_log(marker.trim(), 200), "Fetch diagnostic");
        }
        let failed_fragments = blob.diagnostics();
        let fragments = blob.len();

        let extracted = self.extractor.extract(&blob);
        drop(blob);
        let entries = Arc::new(extracted.entries);

        let snapshot = {
            let entries = Arc::clone(&entries);
            let path = self.snapshot_path.clone();
            persist_blocking("snapshot", move || {
                store::snapshot::persist(&entries, &path)
            })
            .await
        };
        let log = {
            let entries = Arc::clone(&entries);
            let database = self.database.clone();
            let table = self.table.clone();
            persist_blocking("log", move || store::log::persist(&entries, &database, &table)).await
        };

        let report = RunReport {
            started_at,
            finished_at: Local::now().format(RECTIME_FORMAT).to_string(),
            fragments,
            failed_fragments,
            entries: entries.len(),
            time_parse_failures: extracted.time_failures,
            snapshot,
            log,
        };

        if let Some(dir) = &self.report_dir {
            if let Err(e) = json::write_report(&report, dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to write run report");
            }
        }

        let elapsed = t0.elapsed();
        info!(
            ?elapsed,
            entries = report.entries,
            groups = distinct_groups(&entries),
            failed_fragments,
            snapshot_ok = report.snapshot.is_written(),
            log_ok = report.log.is_written(),
            "Run complete"
        );
        report
    }
}

/// Run a blocking sink write off the async workers and fold any failure
/// into a [`SinkOutcome`].
async fn persist_blocking<F>(sink: &'static str, write: F) -> SinkOutcome
where
    F: FnOnce() -> Result<usize, PersistenceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(write).await {
        Ok(Ok(rows)) => SinkOutcome::Written { rows },
        Ok(Err(e)) => {
            error!(sink, error = %e, "Persisting failed");
            SinkOutcome::Failed {
                error: e.to_string(),
            }
        }
        Err(e) => {
            error!(sink, error = %e, "Persist task aborted");
            SinkOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Diagnostic fragments of a blob, for callers that want to show them.
pub fn diagnostics(fragments: &[Fragment]) -> impl Iterator<Item = &str> {
    fragments
        .iter()
        .filter(|f| f.is_diagnostic())
        .map(Fragment::text)
}

/// Number of distinct `(platform, slist)` groups among `entries`.
pub fn distinct_groups(entries: &[RankingEntry]) -> usize {
    use itertools::Itertools;
    entries.iter().map(|e| (&e.platform, &e.slist)).unique().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FRAGMENT: &str = r#"
    <div class="cc-cd">
        <div class="cc-cd-lb">Platform</div>
        <span class="cc-cd-sb-st">List</span>
        <div class="i-h">5分钟前</div>
        <a target="_blank" href="/link1"><span class="t">Title 1</span><span class="e">100</span></a>
        <a target="_blank" href="/link2"><span class="t">Title 2</span><span class="e">200</span></a>
    </div>"#;

    fn settings(server: &MockServer, dir: &std::path::Path, pages: u32) -> Settings {
        Settings {
            origin: server.uri(),
            category_urls: BTreeMap::from([(
                "technological_info".to_string(),
                format!("{}/c/tech", server.uri()),
            )]),
            category_pages: BTreeMap::from([("technological_info".to_string(), pages)]),
            max_retries: 0,
            snapshot_path: dir.join("hot_search.csv"),
            database: dir.join("hotsearch.sqlite"),
            report_dir: Some(dir.join("reports")),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_run_once_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c/tech"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT))
            .expect(6)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&server, dir.path(), 3);
        let pipeline = Pipeline::from_settings(&settings).unwrap();

        let report = pipeline.run_once().await;
        assert_eq!(report.fragments, 3);
        assert_eq!(report.failed_fragments, 0);
        assert_eq!(report.entries, 6);
        assert_eq!(report.snapshot, SinkOutcome::Written { rows: 6 });
        assert_eq!(report.log, SinkOutcome::Written { rows: 6 });

        let snapshot = store::snapshot::read(&settings.snapshot_path).unwrap();
        assert_eq!(snapshot.len(), 6);
        assert!(snapshot.iter().all(|e| e.link.starts_with(&server.uri())));
        assert_eq!(distinct_groups(&snapshot), 1);
        assert_eq!(
            store::log::count_rows(&settings.database, &settings.table).unwrap(),
            6
        );

        // second run: snapshot replaced, log appended
        let report = pipeline.run_once().await;
        assert_eq!(report.entries, 6);
        assert_eq!(store::snapshot::read(&settings.snapshot_path).unwrap().len(), 6);
        assert_eq!(
            store::log::count_rows(&settings.database, &settings.table).unwrap(),
            12
        );

        let day_dirs: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .collect();
        assert_eq!(day_dirs.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_still_yields_entries() {
        let server = MockServer::start().await;
        for page in ["0", "2"] {
            Mock::given(method("GET"))
                .and(path("/c/tech"))
                .and(query_param("p", page))
                .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/c/tech"))
            .and(query_param("p", "1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::from_settings(&settings(&server, dir.path(), 3)).unwrap();

        let report = pipeline.run_once().await;
        assert_eq!(report.fragments, 3);
        assert_eq!(report.failed_fragments, 1);
        assert_eq!(report.entries, 4);
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_block_log() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&server, dir.path(), 1);
        // a directory where the snapshot file should go
        std::fs::create_dir(&settings.snapshot_path).unwrap();
        settings.report_dir = None;
        let pipeline = Pipeline::from_settings(&settings).unwrap();

        let report = pipeline.run_once().await;
        assert!(!report.snapshot.is_written());
        assert_eq!(report.log, SinkOutcome::Written { rows: 2 });
    }

    #[tokio::test]
    async fn test_log_failure_does_not_block_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(&server, dir.path(), 1);
        settings.table = "not a table".to_string();
        let pipeline = Pipeline::from_settings(&settings).unwrap();

        let report = pipeline.run_once().await;
        assert_eq!(report.snapshot, SinkOutcome::Written { rows: 2 });
        assert!(matches!(report.log, SinkOutcome::Failed { .. }));
    }

    #[test]
    fn test_diagnostics_filter() {
        let fragments = vec![
            Fragment::Diagnostic("x".to_string()),
            Fragment::Page {
                category: "c".to_string(),
                page: 0,
                body: "b".to_string(),
            },
        ];
        assert_eq!(diagnostics(&fragments).collect::<Vec<_>>(), ["x"]);
    }
}
