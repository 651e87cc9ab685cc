use std::collections::HashSet;
use std::env;

use anyhow::{Context, Result};

/// Central configuration loaded from environment variables.
///
/// All credentials come from env vars (never hardcoded). The .env file is
/// loaded automatically at startup via dotenvy. Each source carries its own
/// block so the monitors never reach for ambient process state.
pub struct Config {
    pub db_path: String,
    /// Slack incoming-webhook URL. Empty means notifications are disabled —
    /// runs still classify and persist, they just don't dispatch.
    pub webhook_url: String,
    pub appstore: AppStoreConfig,
    pub forum: ForumConfig,
    pub reviewsite: ReviewSiteConfig,
}

pub struct AppStoreConfig {
    pub enabled: bool,
    /// Play Store package name, e.g. "com.example.app".
    pub app_id: String,
    pub hours_back: i64,
}

pub struct ForumConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub subreddit: String,
    /// Lowercased at load; author comparison is case-insensitive.
    pub moderator_usernames: HashSet<String>,
    pub fetch_limit: u32,
    pub hours_back: i64,
}

pub struct ReviewSiteConfig {
    pub enabled: bool,
    /// Company slug from the review-site URL, e.g. "example.com".
    pub company: String,
    pub hours_back: i64,
    pub max_pages: u32,
    /// Only notify on reviews at or below this rating. This is an
    /// adapter-level filter applied after classification — the seen-set
    /// records every review regardless.
    pub rating_threshold: u8,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Numeric options are validated here so a bad value fails the whole
    /// invocation up front instead of one source mid-run.
    pub fn load() -> Result<Self> {
        Ok(Self {
            db_path: env::var("LOOKOUT_DB_PATH").unwrap_or_else(|_| "./lookout.db".to_string()),
            webhook_url: env::var("SLACK_WEBHOOK_URL").unwrap_or_default(),
            appstore: AppStoreConfig {
                enabled: env_flag("RUN_APPSTORE"),
                app_id: env::var("APPSTORE_APP_ID").unwrap_or_default(),
                hours_back: env_hours("APPSTORE_HOURS_BACK", 6)?,
            },
            forum: ForumConfig {
                enabled: env_flag("RUN_FORUM"),
                client_id: env::var("FORUM_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("FORUM_CLIENT_SECRET").unwrap_or_default(),
                username: env::var("FORUM_USERNAME").unwrap_or_default(),
                password: env::var("FORUM_PASSWORD").unwrap_or_default(),
                user_agent: env::var("FORUM_USER_AGENT")
                    .unwrap_or_else(|_| "lookout/0.1 review monitor".to_string()),
                subreddit: env::var("FORUM_SUBREDDIT").unwrap_or_default(),
                moderator_usernames: parse_moderators(
                    &env::var("FORUM_MOD_USERNAMES").unwrap_or_default(),
                ),
                fetch_limit: env_positive("FORUM_FETCH_LIMIT", 25)?,
                hours_back: env_hours("FORUM_HOURS_BACK", 24)?,
            },
            reviewsite: ReviewSiteConfig {
                enabled: env_flag("RUN_REVIEWSITE"),
                company: env::var("REVIEWSITE_COMPANY").unwrap_or_default(),
                hours_back: env_hours("REVIEWSITE_HOURS_BACK", 1)?,
                max_pages: env_positive("REVIEWSITE_MAX_PAGES", 3)?,
                rating_threshold: env_rating("REVIEWSITE_RATING_THRESHOLD", 3)?,
            },
        })
    }

    /// Check that the app-store monitor has what it needs.
    pub fn require_appstore(&self) -> Result<()> {
        if self.appstore.app_id.is_empty() {
            anyhow::bail!(
                "APPSTORE_APP_ID not set. Add the Play Store package name to your .env file."
            );
        }
        Ok(())
    }

    /// Check that the forum monitor has credentials and a target.
    pub fn require_forum(&self) -> Result<()> {
        let f = &self.forum;
        if f.client_id.is_empty()
            || f.client_secret.is_empty()
            || f.username.is_empty()
            || f.password.is_empty()
        {
            anyhow::bail!(
                "Forum credentials incomplete. Set FORUM_CLIENT_ID, FORUM_CLIENT_SECRET,\n\
                 FORUM_USERNAME, and FORUM_PASSWORD in your .env file."
            );
        }
        if f.subreddit.is_empty() {
            anyhow::bail!("FORUM_SUBREDDIT not set. Add it to your .env file.");
        }
        Ok(())
    }

    /// Check that the review-site monitor has a target company.
    pub fn require_reviewsite(&self) -> Result<()> {
        if self.reviewsite.company.is_empty() {
            anyhow::bail!(
                "REVIEWSITE_COMPANY not set. Add the company slug from the review-site\n\
                 URL to your .env file."
            );
        }
        Ok(())
    }
}

/// Per-source enable flags default to on; anything other than "false"
/// (case-insensitive) enables the source.
fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(v) => !v.eq_ignore_ascii_case("false"),
        Err(_) => true,
    }
}

fn env_hours(name: &str, default: i64) -> Result<i64> {
    let hours: i64 = match env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{name} must be a valid integer"))?,
        Err(_) => default,
    };
    if hours <= 0 {
        anyhow::bail!("{name} must be a positive number of hours");
    }
    Ok(hours)
}

fn env_positive(name: &str, default: u32) -> Result<u32> {
    let value: u32 = match env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{name} must be a valid integer"))?,
        Err(_) => default,
    };
    if value == 0 {
        anyhow::bail!("{name} must be a positive integer");
    }
    Ok(value)
}

fn env_rating(name: &str, default: u8) -> Result<u8> {
    let value: u8 = match env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{name} must be a valid integer"))?,
        Err(_) => default,
    };
    if !(1..=5).contains(&value) {
        anyhow::bail!("{name} must be between 1 and 5");
    }
    Ok(value)
}

/// Split a comma-separated list of usernames, trimming and lowercasing each.
fn parse_moderators(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderators_are_trimmed_and_lowercased() {
        let mods = parse_moderators("ModOne, modTWO ,\tmodthree");
        assert_eq!(mods.len(), 3);
        assert!(mods.contains("modone"));
        assert!(mods.contains("modtwo"));
        assert!(mods.contains("modthree"));
    }

    #[test]
    fn empty_moderator_list_yields_empty_set() {
        assert!(parse_moderators("").is_empty());
        assert!(parse_moderators(" , ,").is_empty());
    }
}
