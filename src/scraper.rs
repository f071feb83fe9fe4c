use crate::types::{FetchConfig, LanguageSets, Result, ShelfError, SystemFlags};
use crate::utils::title;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_STORE_BASE: &str = "https://www.gog.com";

/// Best-effort scrape of the public store page for a title.
#[async_trait]
pub trait PageScraper: Send + Sync {
    /// `None` on any failure; partial records are fine.
    async fn scrape(&self, game_title: &str) -> Option<ScrapedPage>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// 0-100 scale.
    pub rating: Option<u8>,
    pub release_date: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub languages: LanguageSets,
    pub systems: SystemFlags,
}

impl ScrapedPage {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.rating.is_none()
            && self.release_date.is_none()
            && self.developer.is_none()
            && self.publisher.is_none()
            && self.languages.is_empty()
            && !self.systems.any()
    }
}

static RE_LD_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script type="application/ld\+json">\s*(\{.*?\})\s*</script>"#).unwrap()
});
static RE_OG_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:(title|description|image)" content="([^"]*)""#).unwrap()
});
static RE_WORKS_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""worksOn":\s*(\{[^}]*\})"#).unwrap());
static RE_DEVELOPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""developers?":\s*\[?\s*\{[^}]*?"name":\s*"([^"]+)""#).unwrap());
static RE_PUBLISHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""publishers?":\s*\[?\s*\{[^}]*?"name":\s*"([^"]+)""#).unwrap());

/// Scraper for GOG store pages.
///
/// Store pages embed the product card as JSON in several places; extraction
/// goes for the JSON-LD product block first and falls back to OpenGraph meta
/// tags and targeted fragments of the embedded card data.
pub struct GogScraper {
    client: Client,
    base_url: String,
}

impl GogScraper {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: DEFAULT_STORE_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShelfError::General(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageScraper for GogScraper {
    async fn scrape(&self, game_title: &str) -> Option<ScrapedPage> {
        let slug = title::normalize_key(game_title);
        if slug.is_empty() {
            return None;
        }
        let url = format!("{}/game/{}", self.base_url, slug);

        let html = match self.fetch_page(&url).await {
            Ok(html) => html,
            Err(e) => {
                debug!("Scrape failed for {}: {}", url, e);
                return None;
            }
        };

        let page = parse_page(&html);
        if page.is_empty() {
            debug!("No product data found on {}", url);
            None
        } else {
            Some(page)
        }
    }
}

pub fn parse_page(html: &str) -> ScrapedPage {
    let mut page = ScrapedPage::default();

    for capture in RE_LD_JSON.captures_iter(html) {
        let raw = &capture[1];
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => apply_ld_product(&mut page, &value),
            Err(e) => trace!("Skipping unparseable JSON-LD block: {}", e),
        }
    }

    for capture in RE_OG_META.captures_iter(html) {
        let content = capture[2].trim();
        if content.is_empty() {
            continue;
        }
        match &capture[1] {
            "title" => {
                page.title.get_or_insert_with(|| content.to_string());
            }
            "description" => {
                page.description.get_or_insert_with(|| content.to_string());
            }
            "image" => {
                page.image.get_or_insert_with(|| content.to_string());
            }
            _ => {}
        }
    }

    if let Some(capture) = RE_WORKS_ON.captures(html) {
        if let Ok(works_on) = serde_json::from_str::<Value>(&capture[1]) {
            page.systems = SystemFlags {
                windows: bool_key(&works_on, "Windows"),
                linux: bool_key(&works_on, "Linux"),
                mac: bool_key(&works_on, "Mac"),
            };
        }
    }

    if page.developer.is_none() {
        page.developer = RE_DEVELOPER
            .captures(html)
            .map(|capture| capture[1].to_string());
    }
    if page.publisher.is_none() {
        page.publisher = RE_PUBLISHER
            .captures(html)
            .map(|capture| capture[1].to_string());
    }

    page
}

fn apply_ld_product(page: &mut ScrapedPage, value: &Value) {
    let kind = value.get("@type").and_then(Value::as_str).unwrap_or("");
    if kind != "Product" && kind != "VideoGame" {
        return;
    }

    if let Some(name) = non_empty(value.get("name")) {
        page.title.get_or_insert(name);
    }
    if let Some(description) = non_empty(value.get("description")) {
        page.description.get_or_insert(description);
    }
    if let Some(image) = ld_image(value.get("image")) {
        page.image.get_or_insert(image);
    }
    if let Some(rating) = ld_rating(value.get("aggregateRating")) {
        page.rating.get_or_insert(rating);
    }
    if let Some(date) = non_empty(value.get("datePublished").or_else(|| value.get("releaseDate"))) {
        page.release_date.get_or_insert(date);
    }
    if let Some(publisher) = value
        .get("publisher")
        .and_then(|p| non_empty(p.get("name")).or_else(|| non_empty(Some(p))))
    {
        page.publisher.get_or_insert(publisher);
    }
    match value.get("inLanguage") {
        Some(Value::String(language)) if !language.is_empty() => {
            page.languages.text.push(language.clone());
            page.languages.text.sort();
            page.languages.text.dedup();
        }
        Some(Value::Array(items)) => {
            for language in items.iter().filter_map(Value::as_str) {
                page.languages.text.push(language.to_string());
            }
            page.languages.text.sort();
            page.languages.text.dedup();
        }
        _ => {}
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ld_image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|url| !url.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Ratings on the page are out of `bestRating` (5 unless stated); callers get
/// the 0-100 scale.
fn ld_rating(value: Option<&Value>) -> Option<u8> {
    let rating = value?;
    let rating_value = number_field(rating.get("ratingValue"))?;
    let best = number_field(rating.get("bestRating")).unwrap_or(5.0);
    if rating_value < 0.0 || best <= 0.0 {
        return None;
    }
    Some((rating_value / best * 100.0).round().min(100.0) as u8)
}

fn number_field(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn bool_key(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Mock scraper for development and testing.
pub struct MockPageScraper {
    page: Option<ScrapedPage>,
    calls: AtomicUsize,
}

impl MockPageScraper {
    pub fn new(page: Option<ScrapedPage>) -> Self {
        Self {
            page,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageScraper for MockPageScraper {
    async fn scrape(&self, _game_title: &str) -> Option<ScrapedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page.clone()
    }
}
