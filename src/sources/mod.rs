// Source adapters — fetch raw records and normalize them into canonical
// reviews.
//
// Every adapter honors the same contract: the returned batch is already
// filtered to the recency window and contains no duplicate ids, so the
// change detector never has to second-guess its input. Rate limiting
// between requests is the adapter's job; the core never sleeps.

pub mod appstore;
pub mod forum;
pub mod rate_limit;
pub mod reviewsite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::model::{Review, Source};

/// One polled review source.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch and normalize all reviews created at or after `cutoff`,
    /// deduplicated by id, in a deterministic order.
    async fn fetch(&self, cutoff: DateTime<Utc>) -> Result<Vec<Review>>;
}

/// Drop repeated ids, keeping the first occurrence and preserving input
/// order. The same underlying review can arrive more than once — the
/// app-store feed returns it under every locale it matches.
pub fn dedup_by_id(reviews: Vec<Review>) -> Vec<Review> {
    let mut seen: HashSet<String> = HashSet::new();
    reviews
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

/// Recency-window check shared by all normalizers.
pub fn within_window(created_at: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    created_at >= cutoff
}

/// Short content-derived identifier: first 16 hex chars of a SHA-256.
///
/// Used where the source gives us no stable id — a scraped review card
/// without a detail link, or a store reply identified only by its text.
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}
