// Seen-set queries — every database interaction goes through this module.
//
// This keeps SQL contained in one place and gives the rest of the app clean
// Rust interfaces. Table names come from Source::seen_table(), which only
// returns static strings, so formatting them into SQL is safe.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::SeenRecord;
use crate::model::{ReplyState, Review, Source};

/// Look up the seen-record for a review id. No side effects.
pub fn lookup_seen(conn: &Connection, source: Source, id: &str) -> Result<Option<SeenRecord>> {
    let sql = format!(
        "SELECT review_id, reply_state, processed_at FROM {} WHERE review_id = ?1",
        source.seen_table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let row: Option<(String, String, String)> = stmt
        .query_row(params![id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, snapshot_json, processed_at)) => {
            let reply_state_snapshot: ReplyState = serde_json::from_str(&snapshot_json)
                .with_context(|| format!("Corrupt reply-state snapshot for {source} review {id}"))?;
            Ok(Some(SeenRecord {
                id,
                reply_state_snapshot,
                processed_at,
            }))
        }
    }
}

/// Record a review as processed (insert if absent, else refresh the reply
/// snapshot). Atomic per id — a single statement, no partial writes visible.
///
/// On conflict only the reply snapshot and processed_at move; the original
/// display columns keep the values from first sight.
pub fn upsert_seen(conn: &Connection, review: &Review) -> Result<()> {
    let snapshot_json = serde_json::to_string(&review.reply_state)?;
    let reply_at = review.reply_state.reply_at().map(|dt| dt.to_rfc3339());

    let sql = format!(
        "INSERT INTO {} (review_id, reply_state, title, content, rating, reviewer,
                         reply_excerpt, reply_at, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
         ON CONFLICT(review_id) DO UPDATE SET
            reply_state = ?2,
            reply_excerpt = ?7,
            reply_at = ?8,
            processed_at = datetime('now')",
        review.source.seen_table()
    );
    conn.execute(
        &sql,
        params![
            review.id,
            snapshot_json,
            review.title,
            review.content,
            review.rating,
            review.reviewer,
            review.reply_state.reply_excerpt(),
            reply_at,
        ],
    )
    .with_context(|| {
        format!(
            "Failed to persist seen-record for {} review {}",
            review.source, review.id
        )
    })?;
    Ok(())
}

/// Convenience projection of `lookup_seen`.
pub fn is_seen(conn: &Connection, source: Source, id: &str) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE review_id = ?1",
        source.seen_table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let row: Option<i64> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
    Ok(row.is_some())
}

// --- Status projections (display only) ---

pub fn seen_count(conn: &Connection, source: Source) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", source.seen_table());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

pub fn last_processed_at(conn: &Connection, source: Source) -> Result<Option<String>> {
    let sql = format!("SELECT MAX(processed_at) FROM {}", source.seen_table());
    let last: Option<String> = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use chrono::Utc;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn sample_review(id: &str, reply_state: ReplyState) -> Review {
        Review {
            id: id.to_string(),
            source: Source::ReviewSite,
            created_at: Utc::now(),
            rating: Some(2),
            reply_state,
            title: "Slow support".to_string(),
            content: "Waited three weeks for an answer.".to_string(),
            reviewer: "Jamie".to_string(),
            url: None,
        }
    }

    #[test]
    fn lookup_absent_returns_none() {
        let conn = test_db();
        assert!(lookup_seen(&conn, Source::ReviewSite, "r1").unwrap().is_none());
        assert!(!is_seen(&conn, Source::ReviewSite, "r1").unwrap());
    }

    #[test]
    fn upsert_then_lookup_roundtrips_snapshot() {
        let conn = test_db();
        let review = sample_review("r1", ReplyState::NoReply);
        upsert_seen(&conn, &review).unwrap();

        let record = lookup_seen(&conn, Source::ReviewSite, "r1").unwrap().unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.reply_state_snapshot, ReplyState::NoReply);
        assert!(is_seen(&conn, Source::ReviewSite, "r1").unwrap());
    }

    #[test]
    fn upsert_overwrites_snapshot_on_conflict() {
        let conn = test_db();
        upsert_seen(&conn, &sample_review("r1", ReplyState::NoReply)).unwrap();

        let replied = ReplyState::Replied {
            reply_ref: "deadbeef".to_string(),
            reply_at: None,
            reply_excerpt: Some("Sorry about that".to_string()),
        };
        upsert_seen(&conn, &sample_review("r1", replied.clone())).unwrap();

        let record = lookup_seen(&conn, Source::ReviewSite, "r1").unwrap().unwrap();
        assert_eq!(record.reply_state_snapshot, replied);
        assert_eq!(seen_count(&conn, Source::ReviewSite).unwrap(), 1);
    }

    #[test]
    fn ids_are_scoped_per_source() {
        let conn = test_db();
        let mut review = sample_review("r1", ReplyState::NoReply);
        upsert_seen(&conn, &review).unwrap();

        review.source = Source::AppStore;
        assert!(!is_seen(&conn, Source::AppStore, "r1").unwrap());
        upsert_seen(&conn, &review).unwrap();

        assert_eq!(seen_count(&conn, Source::AppStore).unwrap(), 1);
        assert_eq!(seen_count(&conn, Source::ReviewSite).unwrap(), 1);
        assert_eq!(seen_count(&conn, Source::Forum).unwrap(), 0);
    }

    #[test]
    fn last_processed_at_tracks_writes() {
        let conn = test_db();
        assert!(last_processed_at(&conn, Source::Forum).unwrap().is_none());
        let mut review = sample_review("p1", ReplyState::NoReply);
        review.source = Source::Forum;
        upsert_seen(&conn, &review).unwrap();
        assert!(last_processed_at(&conn, Source::Forum).unwrap().is_some());
    }
}
