// One monitoring run for a single source: fetch the window, classify
// against the seen-set, dispatch alerts.
//
// Sources never see each other — a broken API or a corrupt table stops
// its own run and nothing else. The caller decides what to do with the
// `RunError`; typically it logs and moves on to the next source.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::detect::{self, Classified};
use crate::dispatch;
use crate::error::RunError;
use crate::model::{Classification, Source};
use crate::notify::Notifier;
use crate::sources::ReviewSource;

/// What one run did, for the terminal report and the logs.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub source: Source,
    pub fetched: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub notified: usize,
    pub notify_failed: usize,
}

/// Run one source end to end.
///
/// `max_rating` restricts alerts to reviews at or below that rating;
/// classification and the seen-set are unaffected, only dispatch is.
pub async fn run(
    adapter: &dyn ReviewSource,
    conn: &Connection,
    notifier: &dyn Notifier,
    hours_back: i64,
    max_rating: Option<u8>,
) -> Result<RunSummary, RunError> {
    let source = adapter.source();
    let cutoff = Utc::now() - Duration::hours(hours_back);

    info!(%source, %cutoff, "Starting run");

    let reviews = adapter
        .fetch(cutoff)
        .await
        .map_err(|inner| RunError::Fetch {
            origin: source,
            inner,
        })?;
    let fetched = reviews.len();

    let classified = detect::classify_batch(conn, source, reviews)?;

    let new = count(&classified, Classification::New);
    let updated = count(&classified, Classification::Updated);
    let unchanged = count(&classified, Classification::Unchanged);

    let to_dispatch: Vec<Classified> = classified
        .into_iter()
        .filter(|item| match (max_rating, item.review.rating) {
            (Some(max), Some(rating)) => rating <= max,
            // No rating on the review, or no threshold configured
            _ => true,
        })
        .collect();

    let suppressed = (new + updated).saturating_sub(
        to_dispatch
            .iter()
            .filter(|i| i.classification != Classification::Unchanged)
            .count(),
    );
    if suppressed > 0 {
        info!(%source, suppressed, "Alerts suppressed by rating threshold");
    }

    let dispatched = dispatch::dispatch_all(notifier, source.display_name(), &to_dispatch).await;
    if dispatched.failed > 0 {
        warn!(%source, failed = dispatched.failed, "Some notifications failed");
    }

    let summary = RunSummary {
        source,
        fetched,
        new,
        updated,
        unchanged,
        notified: dispatched.delivered,
        notify_failed: dispatched.failed,
    };

    info!(
        %source,
        fetched = summary.fetched,
        new = summary.new,
        updated = summary.updated,
        unchanged = summary.unchanged,
        notified = summary.notified,
        "Run complete"
    );

    Ok(summary)
}

fn count(items: &[Classified], classification: Classification) -> usize {
    items
        .iter()
        .filter(|i| i.classification == classification)
        .count()
}
