use crate::api::{ApiProduct, ProductApi};
use crate::cache::{FreshnessCache, COVER_TTL, PAGE_TTL, PRODUCT_TTL};
use crate::manifest::{ManifestEntry, ManifestStore};
use crate::scraper::{PageScraper, ScrapedPage};
use crate::types::{FetchConfig, GameMetadata, LanguageSets, Result};
use crate::utils::{date, title};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Combines the local manifest, the products API and the store page scrape
/// into one normalized record per game.
///
/// `fetch_metadata` never fails the caller: each source is guarded at its
/// boundary and a failure just means that source contributes nothing.
pub struct MetadataAggregator {
    cache: Arc<FreshnessCache>,
    manifest: Arc<ManifestStore>,
    api: Arc<dyn ProductApi>,
    scraper: Arc<dyn PageScraper>,
    http: Client,
    locale: String,
}

impl MetadataAggregator {
    pub fn new(
        cache: Arc<FreshnessCache>,
        manifest: Arc<ManifestStore>,
        api: Arc<dyn ProductApi>,
        scraper: Arc<dyn PageScraper>,
        config: FetchConfig,
        locale: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            cache,
            manifest,
            api,
            scraper,
            http,
            locale: locale.into(),
        }
    }

    /// Aggregate everything known about a game, preferring cached data.
    pub async fn fetch_metadata(&self, product_id: Option<u64>, game_title: &str) -> GameMetadata {
        let page_key = FreshnessCache::key_for(&format!("page:{}", game_title));
        if let Some(record) = self.cache.get_json::<GameMetadata>(&page_key, PAGE_TTL) {
            debug!("Metadata cache hit for '{}'", game_title);
            return record;
        }

        let manifest_entry = self.manifest.lookup(game_title).cloned();
        let display_title = resolve_display_title(game_title, manifest_entry.as_ref());

        let (scraped, api_product) = tokio::join!(
            self.scrape_source(game_title),
            self.api_source(product_id)
        );

        let mut record = merge_sources(
            display_title,
            manifest_entry.as_ref(),
            scraped.as_ref(),
            api_product.as_ref(),
        );

        let cover_url = scraped
            .as_ref()
            .and_then(|s| s.image.clone())
            .or_else(|| api_product.as_ref().and_then(|a| a.image.clone()))
            .or_else(|| manifest_entry.as_ref().and_then(|m| m.image.clone()));
        record.cover = self.resolve_cover(cover_url.as_deref()).await;

        if let Err(e) = self.cache.put_json(&page_key, &record) {
            warn!("Failed to cache metadata for '{}': {}", game_title, e);
        }
        info!(
            "Aggregated metadata for '{}' (scrape: {}, api: {}, manifest: {})",
            game_title,
            scraped.is_some(),
            api_product.is_some(),
            manifest_entry.is_some()
        );
        record
    }

    async fn scrape_source(&self, game_title: &str) -> Option<ScrapedPage> {
        let page = self.scraper.scrape(game_title).await;
        if page.is_none() {
            debug!("Scrape contributed nothing for '{}'", game_title);
        }
        page
    }

    async fn api_source(&self, product_id: Option<u64>) -> Option<ApiProduct> {
        let id = product_id?;
        let key = FreshnessCache::key_for(&format!("product:{}|locale:{}", id, self.locale));
        if let Some(cached) = self.cache.get_json::<ApiProduct>(&key, PRODUCT_TTL) {
            debug!("Product cache hit for {}", id);
            return Some(cached);
        }

        match self.api.fetch_product(id, &self.locale).await {
            Ok(Some(product)) => {
                if let Err(e) = self.cache.put_json(&key, &product) {
                    warn!("Failed to cache product {}: {}", id, e);
                }
                Some(product)
            }
            Ok(None) => {
                debug!("Product {} unknown upstream", id);
                None
            }
            Err(e) => {
                warn!("API fetch failed for product {}: {}", id, e);
                None
            }
        }
    }

    /// Download the chosen cover into the cache and hand back its file name;
    /// the raw URL when the download fails.
    async fn resolve_cover(&self, cover_url: Option<&str>) -> Option<String> {
        let cover_url = cover_url?;
        let file_name = format!(
            "{}.{}",
            FreshnessCache::key_for(cover_url),
            image_extension(cover_url)
        );
        if self.cache.is_fresh(&file_name, COVER_TTL) {
            debug!("Cover cache hit for {}", cover_url);
            return Some(file_name);
        }

        match self.download_cover(cover_url).await {
            Ok(bytes) => match self.cache.put_bytes(&file_name, &bytes) {
                Ok(()) => Some(file_name),
                Err(e) => {
                    warn!("Failed to cache cover {}: {}", cover_url, e);
                    Some(cover_url.to_string())
                }
            },
            Err(e) => {
                warn!("Cover download failed for {}: {}", cover_url, e);
                Some(cover_url.to_string())
            }
        }
    }

    async fn download_cover(&self, cover_url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(cover_url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn resolve_display_title(game_title: &str, manifest_entry: Option<&ManifestEntry>) -> String {
    match manifest_entry {
        Some(entry) => entry
            .long_title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| title::display_from_key(&entry.title)),
        None => title::display_from_key(game_title),
    }
}

fn merge_sources(
    display_title: String,
    manifest_entry: Option<&ManifestEntry>,
    scraped: Option<&ScrapedPage>,
    api_product: Option<&ApiProduct>,
) -> GameMetadata {
    let scraped_title = scraped.and_then(|s| s.title.as_deref());
    let api_title = api_product.and_then(|a| a.title.as_deref());

    let description = api_product
        .and_then(|a| a.description_full.clone())
        .or_else(|| api_product.and_then(|a| a.description_lead.clone()))
        .or_else(|| scraped.and_then(|s| s.description.clone()))
        .unwrap_or_default();

    // Manifest ratings are on a 0-50 scale.
    let rating = scraped
        .and_then(|s| s.rating)
        .or_else(|| api_product.and_then(|a| a.rating))
        .or_else(|| {
            manifest_entry
                .and_then(|m| m.rating)
                .map(|r| ((r as u16) * 2).min(100) as u8)
        });

    let release_date = scraped
        .and_then(|s| s.release_date.as_deref())
        .filter(|d| !d.trim().is_empty())
        .map(date::display)
        .or_else(|| {
            api_product
                .and_then(|a| a.release_date.as_deref())
                .filter(|d| !d.trim().is_empty())
                .map(date::display)
        })
        .or_else(|| {
            manifest_entry
                .and_then(|m| m.release_timestamp)
                .map(date::display_from_timestamp)
        })
        .unwrap_or_default();

    let developer = scraped
        .and_then(|s| s.developer.clone())
        .or_else(|| api_product.and_then(|a| a.developer.clone()))
        .unwrap_or_default();
    let mut publisher = scraped
        .and_then(|s| s.publisher.clone())
        .or_else(|| api_product.and_then(|a| a.publisher.clone()))
        .unwrap_or_default();
    if publisher.is_empty() {
        publisher = developer.clone();
    }

    let empty_languages = LanguageSets::default();
    let languages = scraped
        .map(|s| &s.languages)
        .unwrap_or(&empty_languages)
        .union(api_product.map(|a| &a.languages).unwrap_or(&empty_languages));

    let systems = scraped
        .map(|s| s.systems)
        .unwrap_or_default()
        .union(&api_product.map(|a| a.systems).unwrap_or_default());

    GameMetadata {
        title: pick_title(scraped_title, api_title, display_title),
        description,
        cover: None,
        rating,
        release_date,
        developer,
        publisher,
        languages,
        systems,
    }
}

/// A title that still contains the filler character is never preferred over a
/// higher-fidelity source's title.
fn pick_title(scraped: Option<&str>, api: Option<&str>, fallback: String) -> String {
    for candidate in [scraped, api].into_iter().flatten() {
        if !candidate.is_empty() && !title::has_filler(candidate) {
            return candidate.to_string();
        }
    }
    fallback
}

fn image_extension(cover_url: &str) -> String {
    let path = Url::parse(cover_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| cover_url.to_string());
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "webp" | "gif" => ext,
        _ => "jpg".to_string(),
    }
}
