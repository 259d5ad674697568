//! The two sinks a run is persisted to.
//!
//! | Sink | Module | Semantics |
//! |------|--------|-----------|
//! | Snapshot | [`snapshot`] | CSV file, replaced wholesale every run |
//! | Log | [`log`] | SQLite table, rows appended every run, never deduplicated |
//!
//! Both return a [`PersistenceError`] on failure; the pipeline logs it and
//! carries on with the other sink.

pub mod log;
pub mod snapshot;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to open database {path}: {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to prepare table `{table}`: {reason}")]
    Schema { table: String, reason: String },
    #[error("insert into `{table}` failed, batch rolled back: {source}")]
    Insert {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}
