// Trustpilot review-page adapter.
//
// There is no API here — reviews are scraped from the public listing pages.
// Markup shifts over time, so every field is extracted through a chain of
// selectors tried in order, and anything that still comes out malformed is
// dropped by the validity filter before it can reach the change detector.
//
// Review identity comes from the detail-link URL segment. When a card has
// no detail link the id falls back to a hash of the card's text, which is
// only as stable as the text itself — an accepted weakness of this source.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use regex_lite::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::rate_limit::RequestPacer;
use super::{content_hash, dedup_by_id, within_window, ReviewSource};
use crate::model::{ReplyState, Review, Source};

const CARD_SELECTORS: &[&str] = &[
    "article[data-service-review-card-paper]",
    "div.styles_cardWrapper__g8amG",
    "article[class^=\"styles_reviewCard\"]",
];

const TITLE_SELECTORS: &[&str] = &[
    "h2[data-service-review-title-typography=\"true\"]",
    "a[data-review-title-typography=\"true\"]",
    "h2[data-review-title-typography=\"true\"]",
    "h2",
];

const CONTENT_SELECTORS: &[&str] = &[
    "p[data-service-review-text-typography=\"true\"]",
    "p[data-review-text-typography=\"true\"]",
    "p",
];

const REVIEWER_SELECTORS: &[&str] = &[
    "span[data-consumer-name-typography=\"true\"]",
    "span[data-reviewer-name-typography=\"true\"]",
    "span.name",
];

const RATING_SELECTORS: &[&str] = &["img[alt*=\"Rated\"]", "img[alt*=\"star\"]"];

const DATE_SELECTORS: &[&str] = &[
    "time[data-service-review-date-time-ago=\"true\"]",
    "time[data-review-date-time-ago=\"true\"]",
    "time",
];

const DETAIL_LINK_SELECTORS: &[&str] = &[
    "a[data-review-title-typography=\"true\"]",
    "a[href*=\"/reviews/\"]",
];

const REPLY_TEXT_SELECTOR: &str = "p[data-service-review-business-reply-text-typography]";
const REPLY_DATE_SELECTOR: &str = "time[data-service-review-business-reply-date-time-ago]";

pub struct ReviewSiteSource {
    client: reqwest::Client,
    company: String,
    max_pages: u32,
    pacer: RequestPacer,
}

impl ReviewSiteSource {
    pub fn new(company: String, max_pages: u32) -> Result<Self> {
        // Browser-like headers — the site serves bots a captcha page
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .parse()
                .context("Invalid accept header")?,
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().context("Invalid accept-language header")?,
        );

        let client = reqwest::Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            company,
            max_pages,
            pacer: RequestPacer::new(Duration::from_secs(2)),
        })
    }

    fn base_url(&self) -> String {
        format!("https://www.trustpilot.com/review/{}", self.company)
    }
}

#[async_trait]
impl ReviewSource for ReviewSiteSource {
    fn source(&self) -> Source {
        Source::ReviewSite
    }

    async fn fetch(&self, cutoff: DateTime<Utc>) -> Result<Vec<Review>> {
        let base = self.base_url();
        let mut all = Vec::new();

        for page in 1..=self.max_pages {
            self.pacer.pace().await;
            let url = format!("{base}?page={page}");
            debug!(page, "Fetching review page");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch page {page}"))?;

            // Past the last page — stop paginating, keep what we have
            if response.status() == StatusCode::NOT_FOUND {
                debug!(page, "Page not found, stopping pagination");
                break;
            }
            if !response.status().is_success() {
                let status = response.status();
                anyhow::bail!("Review page {page} returned {status}");
            }

            let html = response
                .text()
                .await
                .with_context(|| format!("Failed to read page {page}"))?;

            let parsed = parse_page(&html, &base, Utc::now());
            if parsed.cards == 0 {
                debug!(page, "No review cards found, stopping pagination");
                break;
            }
            if parsed.skipped > 0 {
                warn!(page, skipped = parsed.skipped, "Dropped invalid review cards");
            }

            all.extend(
                parsed
                    .reviews
                    .into_iter()
                    .filter(|r| within_window(r.created_at, cutoff)),
            );
        }

        let reviews = dedup_by_id(all);
        info!(count = reviews.len(), "Collected review-site reviews");
        Ok(reviews)
    }
}

pub struct PageParse {
    pub reviews: Vec<Review>,
    /// Review cards found in the markup, before validity filtering.
    pub cards: usize,
    pub skipped: usize,
}

/// Parse one listing page. Synchronous on purpose: `Html` is not `Send`,
/// so it must never live across an await point.
pub fn parse_page(html: &str, page_url: &str, now: DateTime<Utc>) -> PageParse {
    let document = Html::parse_document(html);

    let mut cards: Vec<ElementRef> = Vec::new();
    for selector in CARD_SELECTORS {
        if let Ok(sel) = Selector::parse(selector) {
            cards = document.select(&sel).collect();
            if !cards.is_empty() {
                break;
            }
        }
    }

    let mut reviews = Vec::new();
    let mut skipped = 0;
    for card in &cards {
        match extract_review(*card, page_url, now) {
            Some(review) => reviews.push(review),
            None => skipped += 1,
        }
    }

    PageParse {
        cards: cards.len(),
        skipped,
        reviews,
    }
}

/// Extract one review card; None when the card fails the validity filter.
fn extract_review(card: ElementRef, page_url: &str, now: DateTime<Utc>) -> Option<Review> {
    let id = extract_id(card);

    let title = select_text(card, TITLE_SELECTORS)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let content = select_text(card, CONTENT_SELECTORS).unwrap_or_default();

    let reviewer = select_text(card, REVIEWER_SELECTORS)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Anonymous".to_string());

    let rating = extract_rating(card).unwrap_or(0);

    // The listing always shows a timestamp; an unparseable one falls to
    // `now` rather than dropping the card
    let created_at = extract_date(card, DATE_SELECTORS, now).unwrap_or(now);

    let reply_state = extract_reply(card, now);

    let review = Review {
        id,
        source: Source::ReviewSite,
        created_at,
        rating: Some(rating),
        reply_state,
        title,
        content,
        reviewer,
        url: Some(page_url.to_string()),
    };

    if !is_valid_review(&review) {
        return None;
    }
    Some(review)
}

fn extract_id(card: ElementRef) -> String {
    let id_re = Regex::new(r"/reviews/([0-9a-f]+)").expect("static regex");
    for selector in DETAIL_LINK_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for link in card.select(&sel) {
            if let Some(href) = link.value().attr("href") {
                if let Some(captures) = id_re.captures(href) {
                    return captures[1].to_string();
                }
            }
        }
    }

    // No detail link — derive an id from the card text. Not guaranteed
    // stable if the rendered text shifts between fetches.
    let text: String = card.text().collect::<String>().chars().take(200).collect();
    content_hash(&text)
}

fn select_text(card: ElementRef, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(el) = card.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_rating(card: ElementRef) -> Option<u8> {
    let rating_re = Regex::new(r"Rated (\d) out of \d stars").expect("static regex");
    for selector in RATING_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for img in card.select(&sel) {
            if let Some(alt) = img.value().attr("alt") {
                if let Some(captures) = rating_re.captures(alt) {
                    return captures[1].parse().ok();
                }
            }
        }
    }
    None
}

fn extract_date(card: ElementRef, selectors: &[&str], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    for selector in selectors {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for el in card.select(&sel) {
            // Prefer the machine-readable attribute
            if let Some(attr) = el.value().attr("datetime") {
                if let Ok(dt) = DateTime::parse_from_rfc3339(attr) {
                    return Some(dt.with_timezone(&Utc));
                }
            }
            let text = el.text().collect::<String>();
            if let Some(dt) = parse_date_text(&text, now) {
                return Some(dt);
            }
        }
    }
    None
}

fn extract_reply(card: ElementRef, now: DateTime<Utc>) -> ReplyState {
    let Ok(text_sel) = Selector::parse(REPLY_TEXT_SELECTOR) else {
        return ReplyState::NoReply;
    };
    let Some(reply_el) = card.select(&text_sel).next() else {
        return ReplyState::NoReply;
    };

    let reply_text = reply_el.text().collect::<String>().trim().to_string();
    let reply_at = Selector::parse(REPLY_DATE_SELECTOR)
        .ok()
        .and_then(|sel| {
            card.select(&sel).next().and_then(|el| {
                el.value()
                    .attr("datetime")
                    .and_then(|attr| DateTime::parse_from_rfc3339(attr).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .or_else(|| parse_date_text(&el.text().collect::<String>(), now))
            })
        });

    ReplyState::Replied {
        reply_ref: content_hash(&reply_text),
        reply_at,
        reply_excerpt: if reply_text.is_empty() {
            None
        } else {
            Some(reply_text)
        },
    }
}

/// Parse the visible date text: relative phrases like "2 hours ago" first,
/// then a handful of absolute formats that vary by region.
pub fn parse_date_text(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();

    if lower.contains("ago") {
        let number_re = Regex::new(r"(\d+)").expect("static regex");
        let amount: i64 = number_re.captures(&lower)?[1].parse().ok()?;
        let delta = if lower.contains("minute") {
            ChronoDuration::minutes(amount)
        } else if lower.contains("hour") {
            ChronoDuration::hours(amount)
        } else if lower.contains("week") {
            ChronoDuration::weeks(amount)
        } else if lower.contains("day") {
            ChronoDuration::days(amount)
        } else {
            return None;
        };
        return Some(now - delta);
    }

    const FORMATS: &[&str] = &[
        "%b %d, %Y", // Jan 15, 2024
        "%B %d, %Y", // January 15, 2024
        "%d %b %Y",  // 15 Jan 2024
        "%d %B %Y",  // 15 January 2024
        "%Y-%m-%d",  // 2024-01-15
        "%m/%d/%Y",  // 01/15/2024
        "%d/%m/%Y",  // 15/01/2024
    ];
    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Reject reviews that are placeholder noise: the site renders cards for
/// reviews with no real content, and they are worthless as alerts. Invalid
/// cards are dropped before the detector — never stored, never notified.
pub fn is_valid_review(review: &Review) -> bool {
    const INVALID_TITLES: &[&str] =
        &["no title", "", "...", "null", "undefined", "n/a", "not available"];
    const INVALID_CONTENT: &[&str] =
        &["", "...", ".", "no content", "null", "undefined", "n/a", "not available"];
    const INVALID_REVIEWERS: &[&str] = &["anonymous", "", "null", "undefined"];

    let title = review.title.trim().to_lowercase();
    if INVALID_TITLES.contains(&title.as_str()) {
        return false;
    }

    let content = review.content.trim();
    if INVALID_CONTENT.contains(&content.to_lowercase().as_str()) {
        return false;
    }
    if content.chars().count() < 5 {
        return false;
    }
    // Ellipsis-only content of any length
    if !content.is_empty() && content.chars().all(|c| c == '.') {
        return false;
    }

    if INVALID_REVIEWERS.contains(&review.reviewer.trim().to_lowercase().as_str()) {
        return false;
    }

    !matches!(review.rating, None | Some(0) | Some(6..))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(title: &str, content: &str, reviewer: &str, rating: u8) -> Review {
        Review {
            id: "abc123".to_string(),
            source: Source::ReviewSite,
            created_at: Utc::now(),
            rating: Some(rating),
            reply_state: ReplyState::NoReply,
            title: title.to_string(),
            content: content.to_string(),
            reviewer: reviewer.to_string(),
            url: None,
        }
    }

    #[test]
    fn placeholder_title_and_ellipsis_content_are_invalid() {
        assert!(!is_valid_review(&sample("No title", "...", "Jordan", 3)));
        assert!(!is_valid_review(&sample("No Title", "real content here", "Jordan", 3)));
    }

    #[test]
    fn near_empty_content_is_invalid() {
        // 4 chars trimmed — below the minimum
        assert!(!is_valid_review(&sample("Bad app", "bad!", "Jordan", 1)));
        assert!(is_valid_review(&sample("Bad app", "bad!!", "Jordan", 1)));
    }

    #[test]
    fn long_ellipsis_only_content_is_invalid() {
        assert!(!is_valid_review(&sample("Hmm", "........", "Jordan", 3)));
    }

    #[test]
    fn out_of_range_ratings_are_invalid() {
        assert!(!is_valid_review(&sample("Title here", "decent content", "Jordan", 0)));
        assert!(!is_valid_review(&sample("Title here", "decent content", "Jordan", 6)));
        assert!(is_valid_review(&sample("Title here", "decent content", "Jordan", 5)));
    }

    #[test]
    fn placeholder_reviewer_is_invalid() {
        assert!(!is_valid_review(&sample("Title here", "decent content", "Anonymous", 3)));
        assert!(!is_valid_review(&sample("Title here", "decent content", "  null ", 3)));
    }

    #[test]
    fn relative_dates_subtract_from_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_date_text("2 hours ago", now).unwrap(),
            now - ChronoDuration::hours(2)
        );
        assert_eq!(
            parse_date_text("3 days ago", now).unwrap(),
            now - ChronoDuration::days(3)
        );
        assert_eq!(
            parse_date_text("30 minutes ago", now).unwrap(),
            now - ChronoDuration::minutes(30)
        );
        assert_eq!(
            parse_date_text("1 week ago", now).unwrap(),
            now - ChronoDuration::weeks(1)
        );
    }

    #[test]
    fn absolute_date_formats_parse() {
        let now = Utc::now();
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        for text in ["Jan 15, 2024", "January 15, 2024", "15 Jan 2024", "2024-01-15"] {
            assert_eq!(parse_date_text(text, now), Some(expected), "failed: {text}");
        }
    }

    #[test]
    fn unparseable_date_yields_none() {
        let now = Utc::now();
        assert!(parse_date_text("yesterday-ish", now).is_none());
        assert!(parse_date_text("", now).is_none());
    }

    const PAGE: &str = r#"
        <html><body>
        <article data-service-review-card-paper="true">
            <a data-review-title-typography="true" href="/reviews/680e0d032794400de8b82c66">
                <h2 data-service-review-title-typography="true">Terrible support</h2>
            </a>
            <span data-consumer-name-typography="true">Alex P</span>
            <img alt="Rated 1 out of 5 stars" src="stars.svg">
            <time data-service-review-date-time-ago="true" datetime="2025-04-27T12:54:59.000Z">2 days ago</time>
            <p data-service-review-text-typography="true">Nobody answered my ticket for two weeks.</p>
            <div>
                <p data-service-review-business-reply-text-typography="true">We are sorry — please contact us again.</p>
                <time data-service-review-business-reply-date-time-ago="true" datetime="2025-04-28T09:00:00.000Z">1 day ago</time>
            </div>
        </article>
        <article data-service-review-card-paper="true">
            <h2 data-service-review-title-typography="true">No title</h2>
            <p data-service-review-text-typography="true">...</p>
        </article>
        </body></html>
    "#;

    #[test]
    fn parse_page_extracts_valid_cards_and_drops_placeholders() {
        let now = Utc::now();
        let parsed = parse_page(PAGE, "https://www.trustpilot.com/review/example.com", now);

        assert_eq!(parsed.cards, 2);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.reviews.len(), 1);

        let review = &parsed.reviews[0];
        assert_eq!(review.id, "680e0d032794400de8b82c66");
        assert_eq!(review.title, "Terrible support");
        assert_eq!(review.rating, Some(1));
        assert_eq!(review.reviewer, "Alex P");
        assert_eq!(
            review.created_at,
            Utc.with_ymd_and_hms(2025, 4, 27, 12, 54, 59).unwrap()
        );
        assert!(review.reply_state.is_replied());
        assert_eq!(
            review.reply_state.reply_at(),
            Some(Utc.with_ymd_and_hms(2025, 4, 28, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn card_without_detail_link_gets_content_hash_id() {
        let html = r#"
            <article data-service-review-card-paper="true">
                <h2 data-service-review-title-typography="true">Decent overall</h2>
                <span data-consumer-name-typography="true">Sam K</span>
                <img alt="Rated 4 out of 5 stars" src="stars.svg">
                <time datetime="2025-04-27T10:00:00.000Z"></time>
                <p data-service-review-text-typography="true">Does the job, UI could be nicer.</p>
            </article>
        "#;
        let parsed = parse_page(html, "https://example.test", Utc::now());
        assert_eq!(parsed.reviews.len(), 1);
        assert_eq!(parsed.reviews[0].id.len(), 16);

        // Same markup, same id
        let again = parse_page(html, "https://example.test", Utc::now());
        assert_eq!(parsed.reviews[0].id, again.reviews[0].id);
    }

    #[test]
    fn empty_page_reports_zero_cards() {
        let parsed = parse_page("<html><body></body></html>", "https://x", Utc::now());
        assert_eq!(parsed.cards, 0);
        assert!(parsed.reviews.is_empty());
    }
}
