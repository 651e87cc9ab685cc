// Reddit forum adapter.
//
// Auth is the password-grant token exchange (script-type app credentials).
// Each run fetches the newest posts in the configured subreddit, then pulls
// every post's comment tree to decide whether a moderator has answered.
// Author matching is case-insensitive; the moderator set is lowercased at
// config load.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::rate_limit::RequestPacer;
use super::{dedup_by_id, within_window, ReviewSource};
use crate::config::ForumConfig;
use crate::model::{ReplyState, Review, Source};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

pub struct ForumSource {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    subreddit: String,
    moderator_usernames: HashSet<String>,
    fetch_limit: u32,
    pacer: RequestPacer,
}

impl ForumSource {
    pub fn new(cfg: &ForumConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            subreddit: cfg.subreddit.clone(),
            moderator_usernames: cfg.moderator_usernames.clone(),
            fetch_limit: cfg.fetch_limit,
            pacer: RequestPacer::new(Duration::from_secs(1)),
        })
    }

    async fn get_token(&self) -> Result<String> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .context("Token request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Token exchange returned {status}");
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        Ok(token.access_token)
    }

    async fn fetch_new_posts(&self, token: &str) -> Result<Vec<Value>> {
        let url = format!("{API_BASE}/r/{}/new", self.subreddit);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", self.fetch_limit.to_string())])
            .send()
            .await
            .with_context(|| format!("Failed to fetch r/{}/new", self.subreddit))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Post listing returned {status}");
        }

        let listing: Value = response
            .json()
            .await
            .context("Failed to parse post listing")?;
        let children = listing
            .pointer("/data/children")
            .and_then(Value::as_array)
            .cloned()
            .context("Post listing missing data.children")?;

        // Unwrap the "kind"/"data" wrapper around each post
        Ok(children
            .into_iter()
            .filter_map(|child| child.get("data").cloned())
            .collect())
    }

    async fn fetch_comment_children(&self, token: &str, permalink: &str) -> Result<Vec<Value>> {
        let url = format!("{API_BASE}{permalink}.json");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to fetch comments at {permalink}"))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Comment fetch returned {status}");
        }

        let thread: Value = response
            .json()
            .await
            .context("Failed to parse comment thread")?;

        // The thread response is [post listing, comment listing]
        Ok(thread
            .pointer("/1/data/children")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReviewSource for ForumSource {
    fn source(&self) -> Source {
        Source::Forum
    }

    async fn fetch(&self, cutoff: DateTime<Utc>) -> Result<Vec<Review>> {
        let token = self.get_token().await?;
        debug!("Forum token acquired");

        let posts = self.fetch_new_posts(&token).await?;
        info!(count = posts.len(), subreddit = %self.subreddit, "Fetched newest posts");

        let mut reviews = Vec::new();
        for post in &posts {
            let Some(partial) = normalize_post(post) else {
                warn!("Skipping malformed post record");
                continue;
            };
            // Filter before the comment fetch — no point pulling trees for
            // posts outside the window
            if !within_window(partial.created_at, cutoff) {
                continue;
            }

            self.pacer.pace().await;
            let reply_state = match post.get("permalink").and_then(Value::as_str) {
                Some(permalink) => match self.fetch_comment_children(&token, permalink).await {
                    Ok(children) => {
                        let mut flat = Vec::new();
                        flatten_comments(&children, &mut flat);
                        moderator_reply_state(&flat, &self.moderator_usernames)
                    }
                    // One broken thread doesn't poison the batch; worst case
                    // the reply shows up on a later run
                    Err(e) => {
                        warn!(post_id = %partial.id, error = %e, "Comment fetch failed, treating as unanswered");
                        ReplyState::NoReply
                    }
                },
                None => ReplyState::NoReply,
            };

            reviews.push(Review {
                reply_state,
                ..partial
            });
        }

        Ok(dedup_by_id(reviews))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Map a raw post record to a canonical review with a placeholder reply
/// state (the comment tree hasn't been consulted yet).
fn normalize_post(post: &Value) -> Option<Review> {
    let id = post.get("id")?.as_str()?.to_string();
    let created_secs = post.get("created_utc")?.as_f64()? as i64;
    let created_at = Utc.timestamp_opt(created_secs, 0).single()?;
    let permalink = post.get("permalink").and_then(Value::as_str);

    Some(Review {
        id,
        source: Source::Forum,
        created_at,
        rating: None,
        reply_state: ReplyState::NoReply,
        title: post
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        content: post
            .get("selftext")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reviewer: post
            .get("author")
            .and_then(Value::as_str)
            .unwrap_or("[deleted]")
            .to_string(),
        url: permalink.map(|p| format!("https://reddit.com{p}")),
    })
}

/// Flatten a nested comment listing depth-first, parents before children.
/// Only real comments (kind "t1") are kept — "more" stubs are dropped.
fn flatten_comments(children: &[Value], out: &mut Vec<Value>) {
    for child in children {
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };
        out.push(data.clone());

        // replies is either a nested listing object or the empty string
        if let Some(nested) = data
            .pointer("/replies/data/children")
            .and_then(Value::as_array)
        {
            let nested = nested.clone();
            flatten_comments(&nested, out);
        }
    }
}

/// Replied iff any flattened comment's author is in the moderator set.
/// `reply_ref` is the sorted, deduplicated set of matching names.
fn moderator_reply_state(comments: &[Value], moderators: &HashSet<String>) -> ReplyState {
    let mut names: Vec<String> = comments
        .iter()
        .filter_map(|c| c.get("author").and_then(Value::as_str))
        .map(str::to_lowercase)
        .filter(|author| moderators.contains(author))
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        ReplyState::NoReply
    } else {
        ReplyState::Replied {
            reply_ref: names.join(","),
            reply_at: None,
            reply_excerpt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(author: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": { "author": author, "body": "some comment", "replies": replies }
        })
    }

    fn nested_listing(children: Vec<Value>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children } })
    }

    #[test]
    fn flatten_walks_nested_replies_depth_first() {
        let tree = vec![
            comment("alice", nested_listing(vec![comment("bob", json!(""))])),
            comment("carol", json!("")),
        ];
        let mut flat = Vec::new();
        flatten_comments(&tree, &mut flat);

        let authors: Vec<&str> = flat
            .iter()
            .map(|c| c["author"].as_str().unwrap())
            .collect();
        assert_eq!(authors, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn flatten_skips_more_stubs() {
        let tree = vec![
            json!({ "kind": "more", "data": { "count": 12 } }),
            comment("dave", json!("")),
        ];
        let mut flat = Vec::new();
        flatten_comments(&tree, &mut flat);
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn moderator_match_is_case_insensitive_and_sorted() {
        let mods: HashSet<String> = ["modone".to_string(), "modtwo".to_string()].into();
        let comments = vec![
            json!({ "author": "ModTwo" }),
            json!({ "author": "random_user" }),
            json!({ "author": "MODONE" }),
            json!({ "author": "modtwo" }),
        ];
        let state = moderator_reply_state(&comments, &mods);
        match state {
            ReplyState::Replied { reply_ref, .. } => assert_eq!(reply_ref, "modone,modtwo"),
            _ => panic!("expected Replied"),
        }
    }

    #[test]
    fn no_moderator_comment_means_no_reply() {
        let mods: HashSet<String> = ["modone".to_string()].into();
        let comments = vec![json!({ "author": "someone_else" })];
        assert_eq!(
            moderator_reply_state(&comments, &mods),
            ReplyState::NoReply
        );
    }

    #[test]
    fn normalize_post_extracts_fields() {
        let post = json!({
            "id": "abc123",
            "title": "Sync broken after update",
            "selftext": "Nothing uploads anymore.",
            "author": "frustrated_user",
            "created_utc": 1_700_000_000.0,
            "permalink": "/r/example/comments/abc123/sync_broken/"
        });
        let review = normalize_post(&post).unwrap();
        assert_eq!(review.id, "abc123");
        assert_eq!(review.rating, None);
        assert_eq!(review.reviewer, "frustrated_user");
        assert!(review.url.as_deref().unwrap().starts_with("https://reddit.com/r/"));
    }

    #[test]
    fn normalize_post_rejects_missing_id() {
        let post = json!({ "title": "x", "created_utc": 1_700_000_000.0 });
        assert!(normalize_post(&post).is_none());
    }
}
