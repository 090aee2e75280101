//! Vechnost: storefront image warmer
//!
//! Main entry point. Initializes the global allocator and logging, detects
//! the browser profile, starts the offline image worker and warms the
//! catalog's images through it.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vechnost_images::{
    warm_up, BrowserProfile, Catalog, ImagePreloader, LoaderConfig, BACKGROUND_PRELOAD_DELAY,
};
use vechnost_network::{Fetcher, HttpClient};
use vechnost_worker::{
    spawn_worker, ClientEvent, Clients, ControlledFetcher, DiskCacheConfig, DiskCacheStorage,
    ServiceWorker, WorkerConfig, WorkerMessage, WorkerState, WorkerVariant,
};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const CACHE_DIR_VAR: &str = "VECHNOST_CACHE_DIR";
const CATALOG_VAR: &str = "VECHNOST_CATALOG";
const WORKER_VAR: &str = "VECHNOST_WORKER";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Explicit variant if requested, otherwise by profile
fn choose_variant(requested: Option<&str>, profile: &BrowserProfile) -> Result<WorkerVariant> {
    match requested {
        Some(name) => name
            .parse()
            .with_context(|| format!("{WORKER_VAR} is not a worker variant")),
        None if profile.is_constrained() => Ok(WorkerVariant::Constrained),
        None => Ok(WorkerVariant::Full),
    }
}

fn load_catalog() -> Result<Catalog> {
    match env::var(CATALOG_VAR) {
        Ok(path) => Catalog::from_path(&path).with_context(|| format!("loading catalog {path}")),
        Err(_) => Ok(Catalog::builtin()),
    }
}

fn cache_config() -> DiskCacheConfig {
    match env::var(CACHE_DIR_VAR) {
        Ok(dir) => DiskCacheConfig::at(PathBuf::from(dir)),
        Err(_) => DiskCacheConfig::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("Vechnost starting...");

    let profile = BrowserProfile::current();
    let loader_config = LoaderConfig::for_profile(profile);
    loader_config.validate().context("invalid loader configuration")?;
    info!("Body classes: {:?}", loader_config.body_classes());

    let catalog = load_catalog()?;
    let variant = choose_variant(env::var(WORKER_VAR).ok().as_deref(), profile)?;

    let http = Arc::new(HttpClient::with_defaults());
    let storage = Arc::new(DiskCacheStorage::new(cache_config()).context("opening cache storage")?);

    let worker_config = match variant {
        WorkerVariant::Full => WorkerConfig::full(catalog.offline.full.clone()),
        WorkerVariant::Constrained => WorkerConfig::constrained(catalog.offline.constrained.clone()),
    };

    let clients = Clients::new();
    let page = clients.register();
    let worker = Arc::new(
        ServiceWorker::new(worker_config, http.clone(), storage, clients.clone())
            .context("creating worker")?,
    );

    let mut handle = spawn_worker(worker.clone());
    handle.install();
    if let Err(e) = handle.wait_until_active().await {
        warn!("Worker unavailable, loading from the network: {}", e);
    }

    let active = worker.state() == WorkerState::Active;
    let fetcher: Arc<dyn Fetcher> = if active {
        info!(
            "{} controlled by {}",
            page,
            clients.controller(page).unwrap_or_default()
        );
        Arc::new(ControlledFetcher::new(worker.clone(), http.clone()))
    } else {
        http.clone()
    };

    let preloader = ImagePreloader::new(loader_config, fetcher);
    let warm = warm_up(&preloader, &catalog, BACKGROUND_PRELOAD_DELAY).await;

    let bulk_requested =
        active && variant == WorkerVariant::Full && handle.post_message(WorkerMessage::CacheImagesNow);

    let critical = warm.critical;
    let background = warm.finish().await;

    let mut bulk = None;
    if bulk_requested {
        while let Some(event) = handle.next_event().await {
            if let ClientEvent::BulkCacheFinished(report) = event {
                bulk = Some(report);
                break;
            }
        }
    }

    let stats = preloader.stats();
    let (requests, failed_requests, bytes) = http.stats();

    println!("Profile:    {:?} ({} worker)", profile.engine, variant);
    println!(
        "Critical:   {}/{} images",
        critical.loaded, critical.requested
    );
    println!(
        "Products:   {}/{} images",
        background.loaded, background.requested
    );
    if let Some(report) = bulk {
        println!(
            "Offline:    {}/{} images stored by the worker",
            report.cached, report.requested
        );
    }
    println!(
        "Queue:      {} cached, peak {} in flight, {} failed loads",
        stats.cached, stats.peak_loading, stats.loads_failed
    );
    println!(
        "Network:    {} requests, {} failed, {} bytes",
        requests, failed_requests, bytes
    );

    clients.unregister(page);
    handle.shutdown().await;

    info!("Vechnost shutting down");
    Ok(())
}
