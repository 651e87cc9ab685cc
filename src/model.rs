// Core data model — the canonical review item and its classification.
//
// These types are what the change detector and dispatch policy operate on.
// The source adapters produce them; nothing downstream of a normalizer ever
// sees a raw feed record, a forum JSON blob, or an HTML fragment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a review came from. Each source owns its own seen-set table,
/// so identifiers never collide across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    AppStore,
    Forum,
    ReviewSite,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::AppStore => "appstore",
            Source::Forum => "forum",
            Source::ReviewSite => "reviewsite",
        }
    }

    /// The seen-set table for this source. Static strings only — these are
    /// interpolated into SQL.
    pub fn seen_table(&self) -> &'static str {
        match self {
            Source::AppStore => "seen_appstore",
            Source::Forum => "seen_forum",
            Source::ReviewSite => "seen_reviewsite",
        }
    }

    /// Human-facing name used in notifications and summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::AppStore => "Google Play",
            Source::Forum => "Reddit",
            Source::ReviewSite => "Trustpilot",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the company (or a moderator) has answered a review.
///
/// `reply_ref` identifies the reply: a content hash for store/site replies,
/// a comma-joined set of moderator usernames for forum posts. Classification
/// compares only the variant — once a reply is recorded, later edits to its
/// content stay silent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplyState {
    NoReply,
    Replied {
        reply_ref: String,
        reply_at: Option<DateTime<Utc>>,
        reply_excerpt: Option<String>,
    },
}

impl ReplyState {
    pub fn is_replied(&self) -> bool {
        matches!(self, ReplyState::Replied { .. })
    }

    pub fn reply_excerpt(&self) -> Option<&str> {
        match self {
            ReplyState::Replied { reply_excerpt, .. } => reply_excerpt.as_deref(),
            ReplyState::NoReply => None,
        }
    }

    pub fn reply_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReplyState::Replied { reply_at, .. } => *reply_at,
            ReplyState::NoReply => None,
        }
    }
}

/// A normalized review — one per external review or post, rebuilt fresh on
/// every run. `id` is the dedup key: stable across repeated fetches of the
/// same underlying review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub source: Source,
    pub created_at: DateTime<Utc>,
    /// 1-5 star rating; forum posts have none.
    pub rating: Option<u8>,
    pub reply_state: ReplyState,
    // Display payload — carried for notifications and audit columns,
    // never consulted by the change detector.
    pub title: String,
    pub content: String,
    pub reviewer: String,
    pub url: Option<String>,
}

/// The change detector's verdict for one review on one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Never seen before.
    New,
    /// Seen before without a reply; a reply has now appeared.
    Updated,
    /// Nothing notification-worthy changed.
    Unchanged,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Updated => "updated",
            Classification::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_state_serde_roundtrip() {
        let replied = ReplyState::Replied {
            reply_ref: "abc123".to_string(),
            reply_at: None,
            reply_excerpt: Some("Thanks for the feedback".to_string()),
        };
        let json = serde_json::to_string(&replied).unwrap();
        let back: ReplyState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, replied);

        let json = serde_json::to_string(&ReplyState::NoReply).unwrap();
        let back: ReplyState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ReplyState::NoReply);
    }

    #[test]
    fn seen_tables_are_distinct_per_source() {
        let tables = [
            Source::AppStore.seen_table(),
            Source::Forum.seen_table(),
            Source::ReviewSite.seen_table(),
        ];
        assert_eq!(
            tables.iter().collect::<std::collections::HashSet<_>>().len(),
            3
        );
    }
}
