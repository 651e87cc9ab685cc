// Change detection — decides which fetched reviews are worth alerting on.
//
// Every run re-fetches a window of reviews, so most of what arrives has
// been seen before. Classification is per-id and idempotent: feeding the
// same batch through twice yields `New` the first time and `Unchanged`
// after that, no matter how the runs are sliced.

use anyhow::Context;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::queries;
use crate::error::RunError;
use crate::model::{Classification, ReplyState, Review, Source};

/// A review together with its verdict for this run.
#[derive(Debug, Clone)]
pub struct Classified {
    pub review: Review,
    pub classification: Classification,
}

/// Classify one review against its stored snapshot. Pure — no store access.
///
/// The one deliberate quirk: a snapshot that is already `Replied` never
/// re-fires, even when the current reply content differs. Reply edits are
/// silent by policy.
pub fn classify(previous: Option<&ReplyState>, current: &ReplyState) -> Classification {
    match previous {
        None => Classification::New,
        Some(ReplyState::NoReply) if current.is_replied() => Classification::Updated,
        Some(_) => Classification::Unchanged,
    }
}

/// Classify a batch of reviews for one source, persisting seen-records as
/// we go.
///
/// Items are processed independently, in input order. A failed lookup is
/// fatal (`RunError::Store`) — without the seen-set there is no correct
/// answer. A failed write after a New/Updated verdict is NOT fatal: the
/// verdict stands and the item is still reported, trading a possible
/// duplicate alert on the next run for never silently losing one.
pub fn classify_batch(
    conn: &Connection,
    source: Source,
    reviews: Vec<Review>,
) -> Result<Vec<Classified>, RunError> {
    let mut out = Vec::with_capacity(reviews.len());

    for review in reviews {
        let record = queries::lookup_seen(conn, source, &review.id)
            .with_context(|| format!("lookup failed for review {}", review.id))
            .map_err(|inner| RunError::Store {
                origin: source,
                inner,
            })?;

        let classification = classify(
            record.as_ref().map(|r| &r.reply_state_snapshot),
            &review.reply_state,
        );

        debug!(
            source = %source,
            review_id = %review.id,
            classification = %classification,
            "Classified review"
        );

        if classification != Classification::Unchanged {
            if let Err(e) = queries::upsert_seen(conn, &review) {
                warn!(
                    source = %source,
                    review_id = %review.id,
                    error = %e,
                    "Seen-record write failed; reporting the review anyway"
                );
            }
        }

        out.push(Classified {
            review,
            classification,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use chrono::Utc;

    fn replied(reply_ref: &str) -> ReplyState {
        ReplyState::Replied {
            reply_ref: reply_ref.to_string(),
            reply_at: None,
            reply_excerpt: None,
        }
    }

    #[test]
    fn classify_truth_table() {
        // Absent -> New, regardless of reply state
        assert_eq!(classify(None, &ReplyState::NoReply), Classification::New);
        assert_eq!(classify(None, &replied("a")), Classification::New);

        // NoReply -> Replied fires once
        assert_eq!(
            classify(Some(&ReplyState::NoReply), &replied("a")),
            Classification::Updated
        );

        // Same state -> Unchanged
        assert_eq!(
            classify(Some(&ReplyState::NoReply), &ReplyState::NoReply),
            Classification::Unchanged
        );
        assert_eq!(
            classify(Some(&replied("a")), &replied("a")),
            Classification::Unchanged
        );

        // Reply content edits are silent
        assert_eq!(
            classify(Some(&replied("a")), &replied("b")),
            Classification::Unchanged
        );

        // A reply disappearing is not an event either
        assert_eq!(
            classify(Some(&replied("a")), &ReplyState::NoReply),
            Classification::Unchanged
        );
    }

    fn review(id: &str, reply_state: ReplyState) -> Review {
        Review {
            id: id.to_string(),
            source: Source::Forum,
            created_at: Utc::now(),
            rating: None,
            reply_state,
            title: "App keeps crashing".to_string(),
            content: "Every time I open the editor it dies.".to_string(),
            reviewer: "user123".to_string(),
            url: None,
        }
    }

    #[test]
    fn batch_is_idempotent_across_runs() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let first =
            classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)]).unwrap();
        assert_eq!(first[0].classification, Classification::New);

        let second =
            classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)]).unwrap();
        assert_eq!(second[0].classification, Classification::Unchanged);
    }

    #[test]
    fn reply_transition_fires_exactly_once() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let r1 = classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)])
            .unwrap();
        assert_eq!(r1[0].classification, Classification::New);

        let r2 = classify_batch(&conn, Source::Forum, vec![review("p1", replied("mod1"))]).unwrap();
        assert_eq!(r2[0].classification, Classification::Updated);

        // Third run: still replied, different content — silent
        let r3 = classify_batch(&conn, Source::Forum, vec![review("p1", replied("mod2"))]).unwrap();
        assert_eq!(r3[0].classification, Classification::Unchanged);
    }

    #[test]
    fn duplicate_ids_within_one_batch_collapse() {
        // The normalizer contract forbids duplicates within a call, but
        // classification stays safe if one slips through: the second copy
        // sees the record the first one just wrote.
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let out = classify_batch(
            &conn,
            Source::Forum,
            vec![
                review("p1", ReplyState::NoReply),
                review("p1", ReplyState::NoReply),
            ],
        )
        .unwrap();
        assert_eq!(out[0].classification, Classification::New);
        assert_eq!(out[1].classification, Classification::Unchanged);
    }

    #[test]
    fn write_failure_still_reports_the_review() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        // Reads keep working; every write fails
        conn.pragma_update(None, "query_only", true).unwrap();

        let out =
            classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)]).unwrap();
        assert_eq!(out[0].classification, Classification::New);

        // Nothing was persisted, so the next run re-reports it
        conn.pragma_update(None, "query_only", false).unwrap();
        let again =
            classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)]).unwrap();
        assert_eq!(again[0].classification, Classification::New);
    }

    #[test]
    fn missing_table_is_a_store_error() {
        let conn = Connection::open_in_memory().unwrap();
        // No create_tables — lookup must fail fatally
        let err = classify_batch(&conn, Source::Forum, vec![review("p1", ReplyState::NoReply)])
            .unwrap_err();
        assert!(matches!(err, RunError::Store { .. }));
    }
}
