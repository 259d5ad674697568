//! Data models shared by the fetch, extract and store stages.
//!
//! - [`RankingEntry`]: one normalized row of a trending list
//! - [`RunReport`]: what a single pipeline pass produced, per sink
//!
//! Every [`RankingEntry`] field is plain text. Absent values are empty
//! strings, never `None`, so both sinks see the same shape the snapshot
//! header advertises.

use serde::{Deserialize, Serialize};

/// Format used for `rectime` in entries, the snapshot file and the log table.
pub const RECTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single ranking entry scraped from a platform group.
///
/// Field order matters: it is the column order of the snapshot header
/// (`title, link, hotcount, platform, slist, rectime`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RankingEntry {
    /// Headline text of the entry.
    pub title: String,
    /// Absolute URL of the entry.
    pub link: String,
    /// Popularity figure as shown on the site (e.g. `"123万"`), kept as text.
    pub hotcount: String,
    /// Platform label of the enclosing group (e.g. `"微博"`).
    pub platform: String,
    /// Sub-list label of the enclosing group, empty when the group has none.
    pub slist: String,
    /// Group-level recorded time formatted with [`RECTIME_FORMAT`], or empty.
    pub rectime: String,
}

impl RankingEntry {
    /// The recorded time as an SQL value: `None` when empty.
    pub fn rectime_opt(&self) -> Option<&str> {
        if self.rectime.is_empty() {
            None
        } else {
            Some(self.rectime.as_str())
        }
    }
}

/// Result of writing one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SinkOutcome {
    /// The sink accepted `rows` entries.
    Written { rows: usize },
    /// The sink failed; nothing from this run is in it.
    Failed { error: String },
}

impl SinkOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SinkOutcome::Written { .. })
    }
}

/// Summary of one pipeline pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Local start time, [`RECTIME_FORMAT`].
    pub started_at: String,
    /// Local finish time, [`RECTIME_FORMAT`].
    pub finished_at: String,
    /// Fragments in the fetched blob, diagnostics included.
    pub fragments: usize,
    /// Fragments that are diagnostic markers.
    pub failed_fragments: usize,
    /// Entries extracted.
    pub entries: usize,
    /// Groups whose recorded time could not be parsed.
    pub time_parse_failures: usize,
    pub snapshot: SinkOutcome,
    pub log: SinkOutcome,
}
