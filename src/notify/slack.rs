// Slack incoming-webhook notifier.
//
// One Block Kit message per review. Message construction is a pure function
// over the review so the payload shape is testable without a webhook.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{truncate_chars, Notifier};
use crate::model::{Classification, Review};

const MAX_CONTENT_CHARS: usize = 1000;
const MAX_REPLY_CHARS: usize = 500;

pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(
        &self,
        review: &Review,
        classification: Classification,
        display_name: &str,
    ) -> Result<()> {
        let payload = build_payload(review, classification, display_name);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to call Slack webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack webhook returned {status}: {body}");
        }

        info!(
            review_id = %review.id,
            classification = %classification,
            "Slack alert sent"
        );
        Ok(())
    }
}

/// Star string for a rating, e.g. "⭐⭐⭐ (3/5)".
pub fn star_string(rating: u8) -> String {
    let stars: String = std::iter::repeat('⭐').take(rating as usize).collect();
    format!("{stars} ({rating}/5)")
}

/// Build the full webhook payload for one review.
pub fn build_payload(review: &Review, classification: Classification, display_name: &str) -> Value {
    let event = match classification {
        Classification::Updated => "Reply Update",
        _ => "New Review",
    };

    let mut blocks = vec![json!({
        "type": "header",
        "text": {
            "type": "plain_text",
            "text": format!("🚨 {display_name} — {event}")
        }
    })];

    // Title line, linked when we have a URL
    let title_text = match &review.url {
        Some(url) => format!("*{}*\n<{}|View review>", review.title, url),
        None => format!("*{}*", review.title),
    };
    blocks.push(json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": title_text }
    }));

    let mut fields = Vec::new();
    if let Some(rating) = review.rating {
        fields.push(json!({
            "type": "mrkdwn",
            "text": format!("*Rating:*\n{}", star_string(rating))
        }));
    }
    fields.push(json!({
        "type": "mrkdwn",
        "text": format!("*Reviewer:*\n{}", review.reviewer)
    }));
    fields.push(json!({
        "type": "mrkdwn",
        "text": format!("*Date:*\n{}", review.created_at.format("%Y-%m-%d %H:%M:%S UTC"))
    }));
    fields.push(json!({
        "type": "mrkdwn",
        "text": format!("*Review ID:*\n{}", review.id)
    }));
    blocks.push(json!({ "type": "section", "fields": fields }));

    if !review.content.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Review:*```{}```", truncate_chars(&review.content, MAX_CONTENT_CHARS))
            }
        }));
    }

    let reply_line = match review.reply_state.reply_excerpt() {
        Some(excerpt) => format!(
            ":white_check_mark: *Reply received*```{}```",
            truncate_chars(excerpt, MAX_REPLY_CHARS)
        ),
        None if review.reply_state.is_replied() => {
            ":white_check_mark: *Reply received*".to_string()
        }
        None => ":no_entry_sign: *No reply yet*".to_string(),
    };
    blocks.push(json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": reply_line }]
    }));

    blocks.push(json!({ "type": "divider" }));

    json!({ "blocks": blocks })
}
