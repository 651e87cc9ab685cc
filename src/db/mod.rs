// Database layer — the seen-set store.
//
// One SQLite file (rusqlite "bundled", no system dependency) holding a
// seen table per source. `init` creates it; every other command expects
// it to already exist, so a typo'd LOOKOUT_DB_PATH surfaces as a clear
// "run init first" instead of a silently empty seen-set that would
// re-alert on everything.

pub mod models;
pub mod queries;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Create the database (and its parent directory) and ensure the schema.
/// Idempotent; this is what `lookout init` calls.
pub fn initialize(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = open_connection(db_path)?;
    schema::create_tables(&conn)?;
    Ok(conn)
}

/// Open an existing seen-set database; refuses to create one on the fly.
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `lookout init` first.",
            db_path
        );
    }
    open_connection(db_path)
}

fn open_connection(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL keeps readers (a concurrent `lookout status`) from blocking runs
    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(conn)
}
