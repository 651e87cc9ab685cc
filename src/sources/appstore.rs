// Google Play review feed adapter.
//
// The Play Store has no public review API; reviews come from the same
// undocumented `batchexecute` RPC the store frontend uses. The response is
// an anti-XSSI envelope wrapping a JSON string that itself contains a
// positional array per review. The index map below follows the store
// frontend's wire layout and can shift without notice — any row that
// doesn't parse is skipped, never fatal.
//
// The same review can be returned under several (country, language)
// requests, so the batch is deduplicated by review id before it's yielded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::rate_limit::RequestPacer;
use super::{content_hash, dedup_by_id, within_window, ReviewSource};
use crate::model::{ReplyState, Review, Source};

const BATCHEXECUTE_URL: &str = "https://play.google.com/_/PlayStoreUi/data/batchexecute";

/// Reviews fetched per (country, language) request.
const PAGE_SIZE: usize = 50;

/// Fixed fan-out table: which storefronts to poll, and in which languages.
pub const LOCALES: &[(&str, &[&str])] = &[
    ("us", &["en"]),
    ("gb", &["en"]),
    ("in", &["en", "hi"]),
    ("br", &["pt"]),
    ("de", &["de", "en"]),
    ("fr", &["fr", "en"]),
];

pub struct AppStoreSource {
    client: reqwest::Client,
    app_id: String,
    pacer: RequestPacer,
}

impl AppStoreSource {
    pub fn new(app_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("lookout/0.1 review monitor")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            app_id,
            pacer: RequestPacer::new(Duration::from_secs(1)),
        })
    }

    async fn fetch_locale(&self, country: &str, lang: &str) -> Result<Vec<Review>> {
        // RPC "UsvDTd" = fetch reviews; sort mode 2 = newest first.
        let rpc_arg = format!(
            r#"[null,null,[2,2,[{count},null,null],null,[]],[\"{app_id}\",7]]"#,
            count = PAGE_SIZE,
            app_id = self.app_id,
        );
        let f_req = format!(r#"[[["UsvDTd","{rpc_arg}",null,"generic"]]]"#);

        let response = self
            .client
            .post(BATCHEXECUTE_URL)
            .query(&[("hl", lang), ("gl", country)])
            .form(&[("f.req", f_req.as_str())])
            .send()
            .await
            .with_context(|| format!("Review feed request failed for {country}-{lang}"))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Review feed returned {status} for {country}-{lang}");
        }

        let body = response
            .text()
            .await
            .context("Failed to read review feed response")?;

        let rows = parse_envelope(&body)?;
        let mut reviews = Vec::new();
        for row in &rows {
            match parse_review(row, &self.app_id) {
                Some(review) => reviews.push(review),
                None => {
                    warn!(country, lang, "Skipping malformed review row");
                }
            }
        }

        debug!(country, lang, count = reviews.len(), "Fetched locale page");
        Ok(reviews)
    }
}

#[async_trait]
impl ReviewSource for AppStoreSource {
    fn source(&self) -> Source {
        Source::AppStore
    }

    async fn fetch(&self, cutoff: DateTime<Utc>) -> Result<Vec<Review>> {
        let mut all = Vec::new();
        let mut succeeded = 0usize;
        let mut last_err: Option<anyhow::Error> = None;

        for (country, langs) in LOCALES {
            for lang in *langs {
                self.pacer.pace().await;
                match self.fetch_locale(country, lang).await {
                    Ok(batch) => {
                        succeeded += 1;
                        all.extend(
                            batch
                                .into_iter()
                                .filter(|r| within_window(r.created_at, cutoff)),
                        );
                    }
                    // One storefront failing shouldn't starve the others
                    Err(e) => {
                        warn!(country, lang, error = %e, "Locale fetch failed, skipping");
                        last_err = Some(e);
                    }
                }
            }
        }

        if succeeded == 0 {
            return Err(last_err
                .unwrap_or_else(|| anyhow::anyhow!("no locales configured"))
                .context("Every locale fetch failed"));
        }

        let reviews = dedup_by_id(all);
        info!(count = reviews.len(), "Collected app-store reviews");
        Ok(reviews)
    }
}

/// Strip the anti-XSSI prefix and chunk framing, returning the review rows.
fn parse_envelope(body: &str) -> Result<Vec<Value>> {
    // The body is `)]}'` followed by length-prefixed chunks; the payload we
    // want is the first line that is itself a JSON array.
    let payload_line = body
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("[["))
        .context("No payload line in batchexecute response")?;

    let envelope: Value =
        serde_json::from_str(payload_line).context("Malformed batchexecute envelope")?;

    // envelope[0][2] is a JSON string containing the actual response
    let inner_json = envelope
        .get(0)
        .and_then(|e| e.get(2))
        .and_then(Value::as_str)
        .context("Missing inner payload in batchexecute envelope")?;

    let inner: Value = serde_json::from_str(inner_json).context("Malformed inner payload")?;

    Ok(inner
        .get(0)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Decode one positional review row. Returns None when required fields are
/// missing or out of range — callers skip and continue.
///
/// Layout: [0] review id, [1][0] reviewer name, [2] star rating,
/// [4] content, [5][0] epoch seconds, [7] optional reply as
/// [_, content, [epoch seconds, ...]].
fn parse_review(row: &Value, app_id: &str) -> Option<Review> {
    let id = row.get(0)?.as_str()?.to_string();
    let reviewer = row
        .get(1)
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("A Google user")
        .to_string();
    let rating = match row.get(2)?.as_i64()? {
        r @ 1..=5 => r as u8,
        _ => return None,
    };
    let content = row
        .get(4)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let created_secs = row.get(5)?.get(0)?.as_i64()?;
    let created_at = Utc.timestamp_opt(created_secs, 0).single()?;

    let reply_state = match row.get(7).filter(|v| !v.is_null()) {
        Some(reply) => {
            let reply_content = reply.get(1).and_then(Value::as_str);
            let reply_at = reply
                .get(2)
                .and_then(|v| v.get(0))
                .and_then(Value::as_i64)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
            match reply_content {
                Some(text) if !text.is_empty() => ReplyState::Replied {
                    reply_ref: content_hash(text),
                    reply_at,
                    reply_excerpt: Some(text.to_string()),
                },
                _ => ReplyState::NoReply,
            }
        }
        None => ReplyState::NoReply,
    };

    Some(Review {
        id: id.clone(),
        source: Source::AppStore,
        created_at,
        rating: Some(rating),
        reply_state,
        // The store has no review titles
        title: "No title".to_string(),
        content,
        reviewer,
        url: Some(format!(
            "https://play.google.com/store/apps/details?id={app_id}&reviewId={id}"
        )),
    })
}
