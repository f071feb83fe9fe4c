use gogshelf::{
    ApiProduct, FetchConfig, FreshnessCache, LanguageSets, ManifestEntry, ManifestStore,
    MetadataAggregator, MockPageScraper, MockProductApi, ScrapedPage, SystemFlags,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn build_aggregator(
    cache_dir: &Path,
    manifest: ManifestStore,
    api: Arc<MockProductApi>,
    scraper: Arc<MockPageScraper>,
) -> MetadataAggregator {
    let cache = Arc::new(FreshnessCache::new(cache_dir).expect("cache root"));
    MetadataAggregator::new(
        cache,
        Arc::new(manifest),
        api,
        scraper,
        FetchConfig::default(),
        "en-US",
    )
}

fn scraped(title: &str) -> ScrapedPage {
    ScrapedPage {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

fn api_product(title: &str) -> ApiProduct {
    ApiProduct {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn scraped_title_beats_api_title_with_filler() {
    let dir = TempDir::new().unwrap();
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api_product("Foo_Bar")))),
        Arc::new(MockPageScraper::new(Some(scraped("Foo")))),
    );

    let record = aggregator.fetch_metadata(Some(1), "foo").await;
    assert_eq!(record.title, "Foo");
}

#[tokio::test]
async fn filler_scrape_title_defers_to_api() {
    let dir = TempDir::new().unwrap();
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api_product("Foo Bar")))),
        Arc::new(MockPageScraper::new(Some(scraped("Foo_Baz")))),
    );

    let record = aggregator.fetch_metadata(Some(1), "foo").await;
    assert_eq!(record.title, "Foo Bar");
}

#[tokio::test]
async fn all_filler_titles_fall_back_to_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = ManifestStore::from_entries(vec![ManifestEntry {
        title: "foo_bar".to_string(),
        long_title: Some("Foo: The Bar".to_string()),
        image: None,
        rating: None,
        release_timestamp: None,
    }]);
    let aggregator = build_aggregator(
        dir.path(),
        manifest,
        Arc::new(MockProductApi::new(Some(api_product("C_D")))),
        Arc::new(MockPageScraper::new(Some(scraped("A_B")))),
    );

    let record = aggregator.fetch_metadata(Some(1), "foo_bar").await;
    assert_eq!(record.title, "Foo: The Bar");
}

#[tokio::test]
async fn degrades_to_manifest_when_both_fetchers_fail() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let dir = TempDir::new().unwrap();
    let manifest = ManifestStore::from_entries(vec![ManifestEntry {
        title: "outer_wilds".to_string(),
        long_title: Some("Outer Wilds".to_string()),
        image: None,
        rating: Some(45),
        release_timestamp: Some(1428019200),
    }]);
    let aggregator = build_aggregator(
        dir.path(),
        manifest,
        Arc::new(MockProductApi::failing()),
        Arc::new(MockPageScraper::new(None)),
    );

    let record = aggregator.fetch_metadata(Some(1), "outer_wilds").await;
    assert_eq!(record.title, "Outer Wilds");
    assert_eq!(record.rating, Some(90), "manifest ratings are doubled");
    assert_eq!(record.release_date, "03 April 2015");
    assert_eq!(record.description, "");
    assert!(record.cover.is_none());
}

#[tokio::test]
async fn returns_an_empty_record_when_no_source_has_data() {
    let dir = TempDir::new().unwrap();
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::failing()),
        Arc::new(MockPageScraper::new(None)),
    );

    let record = aggregator.fetch_metadata(None, "some_game").await;
    assert_eq!(record.title, "Some Game");
    assert_eq!(record.description, "");
    assert!(record.rating.is_none());
    assert_eq!(record.release_date, "");
    assert_eq!(record.developer, "");
    assert_eq!(record.publisher, "");
    assert!(record.languages.is_empty());
    assert!(!record.systems.any());
}

#[tokio::test]
async fn api_description_is_preferred_over_scrape() {
    let dir = TempDir::new().unwrap();
    let api = ApiProduct {
        description_full: Some("Full description.".to_string()),
        description_lead: Some("Lead.".to_string()),
        ..api_product("Game")
    };
    let page = ScrapedPage {
        description: Some("Scraped description.".to_string()),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api))),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.description, "Full description.");
}

#[tokio::test]
async fn lead_description_fills_in_for_missing_full() {
    let dir = TempDir::new().unwrap();
    let api = ApiProduct {
        description_lead: Some("Lead only.".to_string()),
        ..api_product("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api))),
        Arc::new(MockPageScraper::new(None)),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.description, "Lead only.");
}

#[tokio::test]
async fn scraped_rating_wins_over_api_rating() {
    let dir = TempDir::new().unwrap();
    let api = ApiProduct {
        rating: Some(60),
        ..api_product("Game")
    };
    let page = ScrapedPage {
        rating: Some(80),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api))),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.rating, Some(80));
}

#[tokio::test]
async fn language_sets_are_unioned_and_sorted() {
    let dir = TempDir::new().unwrap();
    let api = ApiProduct {
        languages: LanguageSets {
            audio: vec![],
            text: vec!["French".to_string(), "English".to_string()],
            subtitles: vec!["Polish".to_string()],
        },
        ..api_product("Game")
    };
    let page = ScrapedPage {
        languages: LanguageSets {
            audio: vec!["English".to_string()],
            text: vec!["German".to_string(), "English".to_string()],
            subtitles: vec![],
        },
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api))),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.languages.audio, vec!["English".to_string()]);
    assert_eq!(
        record.languages.text,
        vec![
            "English".to_string(),
            "French".to_string(),
            "German".to_string()
        ]
    );
    assert_eq!(record.languages.subtitles, vec!["Polish".to_string()]);
}

#[tokio::test]
async fn system_flags_are_ored_across_sources() {
    let dir = TempDir::new().unwrap();
    let api = ApiProduct {
        systems: SystemFlags {
            windows: true,
            linux: false,
            mac: false,
        },
        ..api_product("Game")
    };
    let page = ScrapedPage {
        systems: SystemFlags {
            windows: false,
            linux: true,
            mac: false,
        },
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(Some(api))),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert!(record.systems.windows);
    assert!(record.systems.linux);
    assert!(!record.systems.mac);
}

#[tokio::test]
async fn publisher_defaults_to_developer_when_absent() {
    let dir = TempDir::new().unwrap();
    let page = ScrapedPage {
        developer: Some("CD Projekt Red".to_string()),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.developer, "CD Projekt Red");
    assert_eq!(record.publisher, "CD Projekt Red");
}

#[tokio::test]
async fn release_dates_are_normalized_for_display() {
    let dir = TempDir::new().unwrap();
    let page = ScrapedPage {
        release_date: Some("2015-04-03".to_string()),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.release_date, "03 April 2015");
}

#[tokio::test]
async fn unparseable_release_dates_pass_through() {
    let dir = TempDir::new().unwrap();
    let page = ScrapedPage {
        release_date: Some("Q3 2015".to_string()),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.release_date, "Q3 2015");
}

#[tokio::test]
async fn fresh_page_cache_short_circuits_the_fetchers() {
    let dir = TempDir::new().unwrap();

    let first = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        Arc::new(MockPageScraper::new(Some(scraped("First Answer")))),
    );
    let record = first.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.title, "First Answer");

    // Same cache directory, different sources: the cached record wins and the
    // new scraper is never consulted.
    let second_scraper = Arc::new(MockPageScraper::new(Some(scraped("Second Answer"))));
    let second = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        second_scraper.clone(),
    );
    let record = second.fetch_metadata(Some(1), "game").await;
    assert_eq!(record.title, "First Answer");
    assert_eq!(second_scraper.call_count(), 0);
}

#[tokio::test]
async fn api_results_are_cached_per_product_and_locale() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(MockProductApi::new(Some(api_product("Cached Game"))));
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        api.clone(),
        Arc::new(MockPageScraper::new(None)),
    );

    // Distinct titles bypass the page cache; the product cache still serves
    // the second call.
    aggregator.fetch_metadata(Some(42), "game_one").await;
    aggregator.fetch_metadata(Some(42), "game_two").await;
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn cover_falls_back_to_the_raw_url_when_download_fails() {
    let dir = TempDir::new().unwrap();
    let page = ScrapedPage {
        image: Some("http://127.0.0.1:1/cover.jpg".to_string()),
        ..scraped("Game")
    };
    let aggregator = build_aggregator(
        dir.path(),
        ManifestStore::empty(),
        Arc::new(MockProductApi::new(None)),
        Arc::new(MockPageScraper::new(Some(page))),
    );

    let record = aggregator.fetch_metadata(Some(1), "game").await;
    assert_eq!(
        record.cover.as_deref(),
        Some("http://127.0.0.1:1/cover.jpg")
    );
}
