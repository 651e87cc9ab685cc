// Notification dispatch policy.
//
// A review goes out iff it was classified New or Updated, and a given id is
// dispatched at most once per run. Delivery failures are logged and counted,
// never retried, and never block the rest of the batch — the seen-record was
// already written, so a failed delivery is a silent miss by policy.

use std::collections::HashSet;

use tracing::warn;

use crate::detect::Classified;
use crate::model::Classification;
use crate::notify::Notifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Dispatch every alert-worthy item in the batch.
pub async fn dispatch_all(
    notifier: &dyn Notifier,
    display_name: &str,
    items: &[Classified],
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    let mut dispatched: HashSet<&str> = HashSet::new();

    for item in items {
        if item.classification == Classification::Unchanged {
            continue;
        }
        if !dispatched.insert(item.review.id.as_str()) {
            continue;
        }

        summary.attempted += 1;
        match notifier
            .notify(&item.review, item.classification, display_name)
            .await
        {
            Ok(()) => summary.delivered += 1,
            Err(e) => {
                summary.failed += 1;
                warn!(
                    review_id = %item.review.id,
                    error = %e,
                    "Notification delivery failed (will not retry)"
                );
            }
        }
    }

    summary
}
