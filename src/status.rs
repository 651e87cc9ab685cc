// System status display — shows DB stats and per-source seen counts.

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

use crate::config::Config;
use crate::db::{queries, schema};

/// Display system status to the terminal.
pub fn show(conn: &Connection, config: &Config) -> Result<()> {
    let db_path = &config.db_path;
    if !Path::new(db_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `lookout init` to set up the database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    println!("\nSources:");
    for source in schema::ALL_SOURCES {
        let enabled = match source {
            crate::model::Source::AppStore => config.appstore.enabled,
            crate::model::Source::Forum => config.forum.enabled,
            crate::model::Source::ReviewSite => config.reviewsite.enabled,
        };
        let seen = queries::seen_count(conn, source)?;
        let last = queries::last_processed_at(conn, source)?
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<12} {:<9} {} seen, last processed {}",
            source.display_name(),
            if enabled { "enabled" } else { "disabled" },
            seen,
            last,
        );
    }

    if config.webhook_url.is_empty() {
        println!("\nNotifications: disabled (SLACK_WEBHOOK_URL not set)");
    } else {
        println!("\nNotifications: Slack webhook configured");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
