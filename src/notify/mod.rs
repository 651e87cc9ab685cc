// Outbound notification — trait seam plus implementations.
//
// The dispatch policy only knows this trait; formatting and delivery live
// behind it. NoopNotifier is the "webhook not configured" and test path.

pub mod slack;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Classification, Review};

/// Delivers one classified review to wherever alerts go.
///
/// Implementations must not retry: a failed delivery is logged by the
/// dispatcher and the review is never re-sent (its seen-record already
/// holds the new state).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        review: &Review,
        classification: Classification,
        display_name: &str,
    ) -> Result<()>;
}

/// Discards every notification. Used when no webhook URL is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _: &Review, _: Classification, _: &str) -> Result<()> {
        Ok(())
    }
}

/// Truncate to at most `max` characters (not bytes — content is user text
/// and can be multi-byte), appending a marker when something was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}... (truncated)")
}
