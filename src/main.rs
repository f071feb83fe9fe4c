use gogshelf::{
    FetchConfig, FreshnessCache, GogApi, GogScraper, JobRegistry, JobRunner, Library,
    ManifestStore, MetadataAggregator,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting gogshelf backend core");

    let data_dir = env::var("GOGSHELF_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let download_dir = env::var("GOGSHELF_DOWNLOAD_DIR").unwrap_or_else(|_| data_dir.clone());
    let locale = env::var("GOGSHELF_LOCALE").unwrap_or_else(|_| "en-US".to_string());

    let manifest_path = Path::new(&data_dir).join("gog-manifest.json");
    let manifest = if manifest_path.exists() {
        match ManifestStore::load(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Failed to load manifest {}: {}", manifest_path.display(), e);
                ManifestStore::empty()
            }
        }
    } else {
        info!(
            "No manifest at {}, starting with an empty library",
            manifest_path.display()
        );
        ManifestStore::empty()
    };
    let manifest = Arc::new(manifest);

    let cache = Arc::new(FreshnessCache::new(Path::new(&data_dir).join("cache"))?);
    let config = FetchConfig::default();
    let api = Arc::new(GogApi::new(config.clone()));
    let scraper = Arc::new(GogScraper::new(config.clone()));
    let aggregator = MetadataAggregator::new(
        cache.clone(),
        manifest.clone(),
        api,
        scraper,
        config,
        locale,
    );

    let registry = Arc::new(JobRegistry::new());
    let runner = JobRunner::new(registry.clone());
    let library = Library::new(&download_dir);

    let titles = manifest.titles();
    let downloaded = titles
        .iter()
        .filter(|t| library.is_downloaded(t))
        .count();
    info!(
        "Library: {} games in manifest, {} downloaded",
        titles.len(),
        downloaded
    );

    if let Some(first) = titles.first() {
        let record = aggregator.fetch_metadata(None, first).await;
        info!(
            "Sample metadata for '{}': rating {:?}, released {}",
            record.title, record.rating, record.release_date
        );
    }

    // Smoke-check the job runner with a trivial command.
    let job_id = runner
        .start(vec!["uname".to_string(), "-a".to_string()], None)
        .await;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match runner.status(job_id).await {
            Some(snapshot) if snapshot.status.is_terminal() => {
                info!(
                    "Probe job {} finished: status {}, exit code {:?}",
                    job_id, snapshot.status, snapshot.exit_code
                );
                for line in snapshot.output.lines() {
                    info!("  {}", line);
                }
                break;
            }
            Some(_) => continue,
            None => {
                warn!("Probe job {} disappeared from the registry", job_id);
                break;
            }
        }
    }

    info!("gogshelf core ready ({} jobs recorded)", registry.job_count().await);
    Ok(())
}
