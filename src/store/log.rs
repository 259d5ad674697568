//! Log sink: every run appended to an SQLite table.
//!
//! The database file and the table are created on first use. Each run is
//! inserted inside one transaction; if any row fails the whole run is rolled
//! back. Rows from earlier runs are never touched.

use super::PersistenceError;
use crate::models::RankingEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap());

/// Append `entries` to `table` in the SQLite database at `database`.
///
/// Creates the database file and the table when missing. All rows go in
/// through one transaction; if any insert fails nothing is kept.
///
/// # Arguments
///
/// * `entries` - Rows to append, in order; an empty `rectime` becomes `NULL`
/// * `database` - Path of the SQLite file
/// * `table` - Table name, limited to `[A-Za-z_][A-Za-z0-9_]*`
///
/// # Returns
///
/// The number of rows inserted, or a [`PersistenceError`] describing the
/// stage that failed.
#[instrument(level = "info", skip_all, fields(database = %database.display(), %table, count = entries.len()))]
pub fn persist(
    entries: &[RankingEntry],
    database: &Path,
    table: &str,
) -> Result<usize, PersistenceError> {
    if !IDENTIFIER.is_match(table) {
        return Err(PersistenceError::Schema {
            table: table.to_string(),
            reason: "not a valid table name".to_string(),
        });
    }

    let mut conn = connect(database)?;
    init_table(&conn, table)?;
    let inserted = insert_all(&mut conn, table, entries)?;

    info!(inserted, "Appended entries to log table");
    Ok(inserted)
}

fn connect(database: &Path) -> Result<Connection, PersistenceError> {
    let fail = |source: Box<dyn std::error::Error + Send + Sync>| PersistenceError::Connection {
        path: database.to_path_buf(),
        source,
    };

    if let Some(parent) = database.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| fail(e.into()))?;
    }
    let conn = Connection::open(database).map_err(|e| fail(e.into()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .map_err(|e| fail(e.into()))?;
    debug!("Connected to database");
    Ok(conn)
}

fn init_table(conn: &Connection, table: &str) -> Result<(), PersistenceError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            title    TEXT,
            hotcount TEXT,
            link     TEXT,
            platform VARCHAR(50),
            slist    VARCHAR(50),
            rectime  DATETIME
        );"
    ))
    .map_err(|e| PersistenceError::Schema {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

fn insert_all(
    conn: &mut Connection,
    table: &str,
    entries: &[RankingEntry],
) -> Result<usize, PersistenceError> {
    let fail = |source| PersistenceError::Insert {
        table: table.to_string(),
        source,
    };

    // Dropping the transaction without commit rolls the batch back.
    let tx = conn.transaction().map_err(fail)?;
    let mut count = 0;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {table} (title, hotcount, link, platform, slist, rectime)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))
            .map_err(fail)?;
        for e in entries {
            count += stmt
                .execute(rusqlite::params![
                    e.title,
                    e.hotcount,
                    e.link,
                    e.platform,
                    e.slist,
                    e.rectime_opt(),
                ])
                .map_err(fail)?;
        }
    }
    tx.commit().map_err(fail)?;
    Ok(count)
}

/// Number of rows currently in `table`.
#[cfg(test)]
pub fn count_rows(database: &Path, table: &str) -> Result<usize, PersistenceError> {
    if !IDENTIFIER.is_match(table) {
        return Err(PersistenceError::Schema {
            table: table.to_string(),
            reason: "not a valid table name".to_string(),
        });
    }
    let conn = connect(database)?;
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .map_err(|e| PersistenceError::Schema {
            table: table.to_string(),
            reason: e.to_string(),
        })
}
