// Database schema — table creation.
//
// One seen-set table per source, all with the same shape. Only review_id
// and reply_state are ever read back; the remaining columns are an audit
// trail for operational visibility (what did we alert on, and when).

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::Source;

/// Every source that gets a seen-set table.
pub const ALL_SOURCES: [Source; 3] = [Source::AppStore, Source::Forum, Source::ReviewSite];

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    let mut batch = String::from(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    );

    for source in ALL_SOURCES {
        batch.push_str(&seen_table_sql(source));
    }

    conn.execute_batch(&batch)
        .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

fn seen_table_sql(source: Source) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            review_id TEXT PRIMARY KEY,
            reply_state TEXT NOT NULL,     -- JSON snapshot, read back by the detector
            -- Audit columns below are write-only: kept for debugging, never
            -- consulted when classifying.
            title TEXT,
            content TEXT,
            rating INTEGER,
            reviewer TEXT,
            reply_excerpt TEXT,
            reply_at TEXT,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
        table = source.seen_table()
    )
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn one_table_per_source_plus_version() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        // schema_version + seen_appstore + seen_forum + seen_reviewsite
        assert_eq!(table_count(&conn).unwrap(), 4i64);
    }
}
