use crate::types::{FetchConfig, LanguageSets, Result, ShelfError, SystemFlags};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.gog.com";

/// Remote product catalog lookup by store id.
#[async_trait]
pub trait ProductApi: Send + Sync {
    /// Fetch one product record; `Ok(None)` when the id is unknown upstream.
    async fn fetch_product(&self, product_id: u64, locale: &str) -> Result<Option<ApiProduct>>;
}

/// Product record resolved from the API response into a canonical shape.
///
/// The raw response mixes several field conventions (nested descriptions,
/// company objects vs. company lists, multiple release date keys); all of
/// that is resolved once here, and unknown shapes map to absent fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiProduct {
    pub title: Option<String>,
    pub description_lead: Option<String>,
    pub description_full: Option<String>,
    pub image: Option<String>,
    /// Normalized to 0-100 at parse time.
    pub rating: Option<u8>,
    pub release_date: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub languages: LanguageSets,
    pub systems: SystemFlags,
}

impl ApiProduct {
    pub fn from_value(value: &Value) -> Self {
        let description = value.get("description");

        Self {
            title: string_field(value.get("title")),
            description_lead: description.and_then(|d| string_field(d.get("lead"))),
            description_full: description.and_then(|d| string_field(d.get("full"))),
            image: product_image(value),
            rating: product_rating(value),
            release_date: release_date(value),
            developer: company_name(value.get("developer").or_else(|| value.get("developers"))),
            publisher: company_name(value.get("publisher").or_else(|| value.get("publishers"))),
            languages: product_languages(value),
            systems: product_systems(value),
        }
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn product_image(value: &Value) -> Option<String> {
    let images = value.get("images")?;
    let url = string_field(images.get("logo2x")).or_else(|| string_field(images.get("logo")))?;
    if url.starts_with("//") {
        Some(format!("https:{}", url))
    } else {
        Some(url)
    }
}

fn product_rating(value: &Value) -> Option<u8> {
    let raw = value.get("rating").or_else(|| value.get("reviews_rating"))?;
    let number = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if number < 0.0 {
        return None;
    }
    Some(number.round().min(100.0) as u8)
}

/// The API has shipped the release date under several names over time.
fn release_date(value: &Value) -> Option<String> {
    for key in ["release_date", "global_release_date", "date"] {
        if let Some(date) = string_field(value.get(key)) {
            return Some(date);
        }
    }
    None
}

/// Company fields appear as a plain string, a `{name}` object, or a list of
/// such objects; the first resolvable name wins.
fn company_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => string_field(map.get("name")),
        Value::Array(items) => items.iter().find_map(|item| company_name(Some(item))),
        _ => None,
    }
}

fn product_languages(value: &Value) -> LanguageSets {
    let mut text: Vec<String> = match value.get("languages") {
        // Map of code to display name.
        Some(Value::Object(map)) => map
            .values()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    text.sort();
    text.dedup();

    LanguageSets {
        audio: Vec::new(),
        text,
        subtitles: Vec::new(),
    }
}

fn product_systems(value: &Value) -> SystemFlags {
    if let Some(compat) = value
        .get("content_system_compatibility")
        .and_then(Value::as_object)
    {
        return SystemFlags {
            windows: compat.get("windows").and_then(Value::as_bool).unwrap_or(false),
            linux: compat.get("linux").and_then(Value::as_bool).unwrap_or(false),
            mac: compat.get("osx").and_then(Value::as_bool).unwrap_or(false),
        };
    }
    if let Some(systems) = value.get("systems").and_then(Value::as_array) {
        let names: Vec<&str> = systems.iter().filter_map(Value::as_str).collect();
        return SystemFlags {
            windows: names.iter().any(|s| s.eq_ignore_ascii_case("windows")),
            linux: names.iter().any(|s| s.eq_ignore_ascii_case("linux")),
            mac: names
                .iter()
                .any(|s| s.eq_ignore_ascii_case("mac") || s.eq_ignore_ascii_case("osx")),
        };
    }
    SystemFlags::default()
}

/// HTTP client for the GOG products API.
pub struct GogApi {
    client: Client,
    base_url: String,
    config: FetchConfig,
}

impl GogApi {
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
            base_url: DEFAULT_API_BASE.to_string(),
            config,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProductApi for GogApi {
    async fn fetch_product(&self, product_id: u64, locale: &str) -> Result<Option<ApiProduct>> {
        let url = format!(
            "{}/products/{}?expand=description&locale={}",
            self.base_url, product_id, locale
        );
        debug!("Fetching product {} from {}", product_id, url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        debug!("Product {} not found upstream", product_id);
                        return Ok(None);
                    }
                    if !status.is_success() {
                        last_error = Some(ShelfError::General(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));
                    } else {
                        match response.json::<Value>().await {
                            Ok(value) => return Ok(Some(ApiProduct::from_value(&value))),
                            Err(e) => last_error = Some(ShelfError::Http(e)),
                        }
                    }
                }
                Err(e) => last_error = Some(ShelfError::Http(e)),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(
                        "Attempt {} failed for product {}, retrying in {:?}",
                        attempt + 1,
                        product_id,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ShelfError::General("Product fetch failed".to_string())))
    }
}

/// Mock product API for development and testing.
pub struct MockProductApi {
    product: Option<ApiProduct>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockProductApi {
    pub fn new(product: Option<ApiProduct>) -> Self {
        Self {
            product,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            product: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductApi for MockProductApi {
    async fn fetch_product(&self, _product_id: u64, _locale: &str) -> Result<Option<ApiProduct>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ShelfError::General("mock API failure".to_string()));
        }
        Ok(self.product.clone())
    }
}
