//! Best-effort scraping of a company's public website.
//!
//! The heuristics are deliberately loose (substring matches on ids, classes and
//! page text) and carry no correctness guarantee. Failures never escape: a
//! fetch error yields the degraded record.

use crate::errors::AppError;
use crate::models::{
    EnrichmentData, Leader, Scraped, NONE_DETECTED_ON_WEBSITE, NOT_FOUND_ON_WEBSITE,
    WEBSITE_FETCH_FAILED,
};
use async_trait::async_trait;
use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const ABOUT_MAX_CHARS: usize = 500;
const RISK_CONTEXT_CHARS: usize = 50;
const MAX_LEADERSHIP_HEADINGS: usize = 5;
/// Default cap on how much of a page body is read.
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

const TEAM_TERMS: &[&str] = &["team", "leadership", "management", "founders"];
const SOCIAL_PLATFORMS: &[&str] = &["linkedin", "twitter", "facebook", "instagram"];
const RISK_KEYWORDS: &[&str] = &[
    "litigation",
    "lawsuit",
    "legal action",
    "investigation",
    "regulatory",
    "compliance",
    "penalty",
    "fine",
    "settlement",
    "data breach",
    "security incident",
    "controversy",
    "scandal",
    "bankruptcy",
    "restructuring",
    "layoffs",
];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern is valid")
});

/// Source of website enrichment.
#[async_trait]
pub trait WebsiteScraper: Send + Sync {
    /// Never fails; unreachable sites produce a degraded record.
    async fn scrape(&self, website: &str) -> EnrichmentData;
}

/// Fetches the page over HTTP and runs [`extract_enrichment`] on it.
#[derive(Clone)]
pub struct HtmlScraper {
    client: reqwest::Client,
    max_page_bytes: usize,
}

impl HtmlScraper {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create website client: {}", e))
            })?;

        Ok(Self {
            client,
            max_page_bytes: MAX_PAGE_BYTES,
        })
    }

    /// Bodies past `limit` bytes are cut off before parsing.
    pub fn with_max_page_bytes(mut self, limit: usize) -> Self {
        self.max_page_bytes = limit;
        self
    }

    async fn fetch(&self, url: Url) -> Result<String, AppError> {
        tracing::debug!("Fetching company website: {}", url);

        let mut response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Non-success status {} for {}",
                response.status(),
                url
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_page_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!("Truncated {} at {} bytes", url, self.max_page_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl WebsiteScraper for HtmlScraper {
    async fn scrape(&self, website: &str) -> EnrichmentData {
        let Some(url) = normalize_website_url(website) else {
            tracing::warn!("Ignoring unusable website URL '{}'", website);
            return EnrichmentData::degraded(WEBSITE_FETCH_FAILED);
        };

        match self.fetch(url).await {
            Ok(html) => extract_enrichment(&html),
            Err(e) => {
                tracing::warn!("Error fetching {}: {}", website, e);
                EnrichmentData::degraded(WEBSITE_FETCH_FAILED)
            }
        }
    }
}

/// Memoizes successful scrapes by normalized URL.
///
/// Degraded records are not cached so a transient fetch failure is retried on
/// the next request.
pub struct CachedScraper<S> {
    inner: S,
    cache: Cache<String, EnrichmentData>,
}

impl<S: WebsiteScraper> CachedScraper<S> {
    /// Wraps `inner` with a cache of `max_capacity` entries living for `ttl`.
    pub fn new(inner: S, ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
        }
    }
}

#[async_trait]
impl<S: WebsiteScraper> WebsiteScraper for CachedScraper<S> {
    async fn scrape(&self, website: &str) -> EnrichmentData {
        let key = normalize_website_url(website)
            .map(|url| url.to_string())
            .unwrap_or_else(|| website.trim().to_string());

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Website cache hit for {}", key);
            return hit;
        }

        let data = self.inner.scrape(website).await;
        if data.about_info != WEBSITE_FETCH_FAILED {
            self.cache.insert(key, data.clone()).await;
        }
        data
    }
}

/// Parses a user-typed website, assuming `https://` when no scheme is given.
pub fn normalize_website_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    Url::parse(&candidate)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

/// Runs every heuristic over one HTML page.
pub fn extract_enrichment(html: &str) -> EnrichmentData {
    let document = Html::parse_document(html);
    let page_text = visible_text(document.root_element());

    let leaders = extract_leadership(&document);
    let contact = extract_contact_info(html);
    let social = extract_social_media(&document);
    let risks = detect_risk_mentions(&page_text);

    EnrichmentData {
        about_info: truncate_chars(&extract_about(&document, &page_text), ABOUT_MAX_CHARS),
        leadership_info: Some(found_or(leaders, NOT_FOUND_ON_WEBSITE)),
        contact_info: Some(found_or(contact, NOT_FOUND_ON_WEBSITE)),
        social_media: Some(found_or(social, NOT_FOUND_ON_WEBSITE)),
        potential_risks: Some(found_or(risks, NONE_DETECTED_ON_WEBSITE)),
    }
}

fn found_or<T: IsEmpty>(value: T, sentinel: &str) -> Scraped<T> {
    if value.is_empty() {
        Scraped::Missing(sentinel.to_string())
    } else {
        Scraped::Found(value)
    }
}

trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

/// About-section text, falling back to the meta description and then the page start.
pub fn extract_about(document: &Html, page_text: &str) -> String {
    let section = first_with_attr(document, "[id]", "id", &["about"])
        .or_else(|| first_with_attr(document, "section[class]", "class", &["about"]))
        .or_else(|| first_with_attr(document, "div[class]", "class", &["about"]))
        .or_else(|| parent_of_text(document, "About Us"));

    if let Some(text) = section.map(visible_text).filter(|t| !t.is_empty()) {
        return text;
    }

    if let Some(description) = meta_description(document) {
        return description;
    }

    format!("{}...", truncate_chars(page_text, ABOUT_MAX_CHARS))
}

/// Names and titles from team or leadership sections.
///
/// Each of the first five headings in a section counts as a name when it has at
/// least two words; the title is the next `p`, `span` or `div` in document order.
pub fn extract_leadership(document: &Html) -> Vec<Leader> {
    let Ok(headings) = Selector::parse("h2, h3, h4, strong") else {
        return Vec::new();
    };

    let sections = [
        first_with_attr(document, "[id]", "id", TEAM_TERMS),
        first_with_attr(document, "section[class]", "class", TEAM_TERMS),
        first_with_attr(document, "div[class]", "class", TEAM_TERMS),
    ];

    let mut leaders: Vec<Leader> = Vec::new();
    for section in sections.into_iter().flatten() {
        for heading in section.select(&headings).take(MAX_LEADERSHIP_HEADINGS) {
            let name = visible_text(heading);
            if name.split_whitespace().count() < 2 {
                continue;
            }
            if leaders.iter().any(|leader| leader.name == name) {
                continue;
            }
            let title = next_text_block(document, heading)
                .map(visible_text)
                .unwrap_or_default();
            leaders.push(Leader { name, title });
        }
    }

    leaders
}

/// First email address anywhere in the raw page source.
pub fn extract_contact_info(html: &str) -> BTreeMap<String, String> {
    let mut contact = BTreeMap::new();
    if let Some(email) = EMAIL.find(html) {
        contact.insert("email".to_string(), email.as_str().to_string());
    }
    contact
}

/// First link per social platform.
pub fn extract_social_media(document: &Html) -> BTreeMap<String, String> {
    let mut social = BTreeMap::new();
    let Ok(links) = Selector::parse("a[href]") else {
        return social;
    };

    for platform in SOCIAL_PLATFORMS {
        let href = document
            .select(&links)
            .filter_map(|a| a.value().attr("href"))
            .find(|href| href.to_lowercase().contains(platform));
        if let Some(href) = href {
            social.insert(platform.to_string(), href.to_string());
        }
    }

    social
}

/// One mention per risk keyword found in the page text, with surrounding context.
///
/// Plain substring matching: "fine" also matches "define".
pub fn detect_risk_mentions(page_text: &str) -> Vec<String> {
    let text = page_text.to_lowercase();

    RISK_KEYWORDS
        .iter()
        .filter_map(|keyword| {
            let pos = text.find(keyword)?;
            let mut start = pos.saturating_sub(RISK_CONTEXT_CHARS);
            while !text.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = (pos + keyword.len() + RISK_CONTEXT_CHARS).min(text.len());
            while !text.is_char_boundary(end) {
                end += 1;
            }
            Some(format!(
                "Potential {} mention: '{}'",
                keyword,
                &text[start..end]
            ))
        })
        .collect()
}

// ============ DOM helpers ============

fn first_with_attr<'a>(
    document: &'a Html,
    selector: &str,
    attr: &str,
    terms: &[&str],
) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).find(|element| {
        element
            .value()
            .attr(attr)
            .map(|value| {
                let value = value.to_lowercase();
                terms.iter().any(|term| value.contains(term))
            })
            .unwrap_or(false)
    })
}

fn parent_of_text<'a>(document: &'a Html, needle: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .find(|node| {
            node.value()
                .as_text()
                .map(|text| text.contains(needle))
                .unwrap_or(false)
        })
        .and_then(|node| node.parent())
        .and_then(ElementRef::wrap)
}

fn meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(String::from)
}

/// The first `p`, `span` or `div` element after `anchor` in document order.
fn next_text_block<'a>(document: &'a Html, anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .skip_while(|node| node.id() != anchor.id())
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|element| matches!(element.value().name(), "p" | "span" | "div"))
}

/// Whitespace-joined text of an element, skipping scripts and styles.
fn visible_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });
            (!hidden).then(|| text.trim())
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
