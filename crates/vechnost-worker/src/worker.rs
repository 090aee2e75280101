//! Service worker lifecycle and fetch handling
//!
//! `Parsed -> Installing -> Installed -> Active`, or `Redundant` when install
//! fails or a newer version takes over. Image requests are served
//! cache-first from the versioned image bucket with a placeholder when the
//! network is down; the full variant also answers other requests
//! network-first and runs the bulk cache job.

use crate::clients::Clients;
use crate::config::{ConfigError, WorkerConfig, WorkerVariant};
use crate::message::{CACHE_ALL_IMAGES_TAG, WorkerMessage};
use crate::placeholder::placeholder_response;
use crate::storage::{CacheStorage, CachedResponse, StorageError};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use vechnost_network::{FetchRequest, Fetcher, HttpError, RequestMode, Response};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not yet installing
    Parsed,
    Installing,
    /// Precache done, waiting to activate
    Installed,
    /// Controls clients and handles fetches
    Active,
    /// Failed install or superseded
    Redundant,
}

/// Errors raised by the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] HttpError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Precache of {url} failed: {reason}")]
    Precache { url: String, reason: String },

    #[error("Invalid state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },

    #[error("{0} is not supported by the {1} worker")]
    Unsupported(&'static str, WorkerVariant),

    #[error("Lifecycle failed: {0}")]
    Lifecycle(String),

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("Worker stopped")]
    Stopped,
}

/// What the worker does with an intercepted request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Answer with this response
    Respond(Response),
    /// Not intercepted; the page goes to the network itself
    Passthrough,
}

/// Result of activation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted_buckets: usize,
    pub claimed_clients: usize,
}

/// Result of one bulk cache run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkCacheReport {
    pub requested: usize,
    pub cached: usize,
    pub failed: usize,
}

/// One worker version
pub struct ServiceWorker {
    config: WorkerConfig,
    network: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    clients: Clients,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        network: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        clients: Clients,
    ) -> Result<Self, WorkerError> {
        config.validate()?;

        Ok(Self {
            config,
            network,
            storage,
            clients,
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Version tag, the image bucket name
    pub fn version(&self) -> &str {
        &self.config.image_bucket
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), WorkerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(WorkerError::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }

    /// Precache the critical images. All of them are stored or none are;
    /// on failure the worker becomes redundant.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!("Installing {} worker {}", self.config.variant, self.version());

        match self.precache().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                info!("Critical images cached ({})", count);
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                warn!("Install of {} failed: {}", self.version(), e);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, WorkerError> {
        let bucket = &self.config.image_bucket;
        self.storage.open(bucket).await?;

        let mut fetches = JoinSet::new();
        for url in &self.config.critical_images {
            let network = Arc::clone(&self.network);
            let url = url.clone();
            fetches.spawn(async move {
                let result = network.fetch(&FetchRequest::new(url.clone())).await;
                (url, result)
            });
        }

        // Dropping the set on the first failure aborts the rest
        let mut entries = Vec::with_capacity(self.config.critical_images.len());
        while let Some(joined) = fetches.join_next().await {
            let (url, result) = joined.map_err(|e| WorkerError::Task(e.to_string()))?;
            let response = result.map_err(|e| WorkerError::Precache {
                url: url.clone(),
                reason: e.to_string(),
            })?;

            if !response.is_success() {
                return Err(WorkerError::Precache {
                    url,
                    reason: format!("status {}", response.status),
                });
            }
            entries.push(CachedResponse::from_response(&url, &response));
        }

        let count = entries.len();
        self.storage.put_all(bucket, entries).await?;
        Ok(count)
    }

    /// Delete every bucket but the current version tags, then claim all
    /// registered clients
    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        let state = self.state();
        if state != WorkerState::Installed {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Installed,
                actual: state,
            });
        }

        let retained = self.config.retained_buckets();
        let mut deleted_buckets = 0;
        for name in self.storage.keys().await? {
            if retained.contains(&name.as_str()) {
                continue;
            }
            info!("Deleting old cache: {}", name);
            match self.storage.delete(&name).await {
                Ok(true) => deleted_buckets += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to delete cache {}: {}", name, e),
            }
        }

        self.set_state(WorkerState::Active);
        let claimed_clients = self.clients.claim(self.version());
        info!(
            "Worker {} active, {} clients claimed",
            self.version(),
            claimed_clients
        );

        Ok(ActivationReport {
            deleted_buckets,
            claimed_clients,
        })
    }

    /// Install, then activate without waiting
    pub async fn start(&self) -> Result<ActivationReport, WorkerError> {
        self.install().await?;
        self.activate().await
    }

    /// A newer version took over
    pub fn supersede(&self) {
        self.set_state(WorkerState::Redundant);
        debug!("Worker {} superseded", self.version());
    }

    /// Decide how to answer a page request
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, WorkerError> {
        if self.state() != WorkerState::Active {
            return Ok(FetchOutcome::Passthrough);
        }

        if self.config.is_image_request(request) {
            return Ok(FetchOutcome::Respond(self.cache_first(request).await));
        }

        if self.config.intercepts_non_images() {
            return self.network_first(request).await.map(FetchOutcome::Respond);
        }

        Ok(FetchOutcome::Passthrough)
    }

    /// Stored copy, else network (stored for next time), else placeholder
    async fn cache_first(&self, request: &FetchRequest) -> Response {
        let bucket = &self.config.image_bucket;

        match self.storage.match_in(bucket, &request.url).await {
            Ok(Some(hit)) => {
                debug!("Image from cache: {}", request.url);
                return hit.into_response();
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed: {}", request.url, e),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                let entry = CachedResponse::from_response(&request.url, &response);
                match self.storage.put(bucket, entry).await {
                    Ok(()) => debug!("Cached new image: {}", request.url),
                    Err(e) => warn!("Failed to cache {}: {}", request.url, e),
                }
                response
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", request.url, e);
                placeholder_response()
            }
        }
    }

    /// Network, else any stored copy
    async fn network_first(&self, request: &FetchRequest) -> Result<Response, WorkerError> {
        let error = match self.network.fetch(request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        match self.storage.match_any(&request.url).await {
            Ok(Some(hit)) => {
                debug!("Offline fallback from cache: {}", request.url);
                Ok(hit.into_response())
            }
            Ok(None) => Err(error.into()),
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", request.url, e);
                Err(error.into())
            }
        }
    }

    /// Walk every known image in fixed batches, storing successful or opaque
    /// responses. Failures are counted and otherwise ignored.
    pub async fn cache_all_images(&self) -> Result<BulkCacheReport, WorkerError> {
        if !self.config.supports_bulk_cache() {
            return Err(WorkerError::Unsupported("Bulk caching", self.config.variant));
        }

        info!("Background caching {} images", self.config.known_images.len());
        let mut report = BulkCacheReport {
            requested: self.config.known_images.len(),
            ..BulkCacheReport::default()
        };

        let batch_size = self.config.bulk_batch_size.max(1);
        let batch_count = self.config.known_images.len().div_ceil(batch_size);

        for (index, batch) in self.config.known_images.chunks(batch_size).enumerate() {
            let mut fetches = JoinSet::new();
            for url in batch {
                let network = Arc::clone(&self.network);
                let storage = Arc::clone(&self.storage);
                let bucket = self.config.image_bucket.clone();
                let url = url.clone();
                fetches.spawn(async move { cache_one(network, storage, &bucket, url).await });
            }

            while let Some(joined) = fetches.join_next().await {
                match joined {
                    Ok(true) => report.cached += 1,
                    _ => report.failed += 1,
                }
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.bulk_batch_delay).await;
            }
        }

        info!(
            "All images cached in background ({}/{})",
            report.cached, report.requested
        );
        Ok(report)
    }

    /// React to a page message
    pub async fn handle_message(&self, message: &WorkerMessage) -> Option<BulkCacheReport> {
        match message {
            WorkerMessage::CacheImagesNow => self.run_bulk_job().await,
        }
    }

    /// React to a background sync
    pub async fn handle_sync(&self, tag: &str) -> Option<BulkCacheReport> {
        if tag == CACHE_ALL_IMAGES_TAG {
            self.run_bulk_job().await
        } else {
            debug!("Ignoring sync tag {:?}", tag);
            None
        }
    }

    async fn run_bulk_job(&self) -> Option<BulkCacheReport> {
        match self.cache_all_images().await {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("Bulk cache request ignored: {}", e);
                None
            }
        }
    }
}

async fn cache_one(
    network: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    bucket: &str,
    url: String,
) -> bool {
    let request = FetchRequest::image(url.clone()).with_mode(RequestMode::NoCors);
    let response = match network.fetch(&request).await {
        Ok(response) if response.is_success() || response.is_opaque() => response,
        Ok(response) => {
            debug!("Not caching {}: status {}", url, response.status);
            return false;
        }
        Err(e) => {
            debug!("Failed to cache {}: {}", url, e);
            return false;
        }
    };

    match storage.put(bucket, CachedResponse::from_response(&url, &response)).await {
        Ok(()) => {
            debug!("Cached: {}", url);
            true
        }
        Err(e) => {
            warn!("Failed to store {}: {}", url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::{PLACEHOLDER_CONTENT_TYPE, PLACEHOLDER_SVG};
    use crate::storage::MemoryCacheStorage;
    use crate::test_support::{FailingStorage, MockNetwork};
    use std::time::Duration;
    use vechnost_network::{ResponseType, StatusCode};

    fn urls(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://i.imgur.com/{prefix}{i}.jpeg")).collect()
    }

    fn worker(
        config: WorkerConfig,
        network: &Arc<MockNetwork>,
        storage: &Arc<MemoryCacheStorage>,
    ) -> ServiceWorker {
        ServiceWorker::new(config, network.clone(), storage.clone(), Clients::new()).unwrap()
    }

    #[tokio::test]
    async fn test_install_stores_exactly_the_critical_set() {
        for config in [
            WorkerConfig::constrained(urls("s", 10)),
            WorkerConfig::full(urls("u", 40)),
        ] {
            let network = Arc::new(MockNetwork::online());
            let storage = Arc::new(MemoryCacheStorage::new());
            let sw = worker(config.clone(), &network, &storage);

            assert_eq!(sw.install().await.unwrap(), config.critical_images.len());
            assert_eq!(sw.state(), WorkerState::Installed);

            let mut expected = config.critical_images.clone();
            expected.sort();
            assert_eq!(storage.urls(&config.image_bucket).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_failed_install_stores_nothing() {
        let critical = urls("s", 4);
        let network = Arc::new(MockNetwork::online().failing_for(&critical[2]));
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::constrained(critical), &network, &storage);

        assert!(matches!(sw.install().await, Err(WorkerError::Precache { .. })));
        assert_eq!(sw.state(), WorkerState::Redundant);
        assert!(storage.urls(&sw.config().image_bucket).await.unwrap().is_empty());

        // A redundant worker never activates
        assert!(matches!(sw.activate().await, Err(WorkerError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_install_requires_success_status() {
        let critical = urls("s", 2);
        let network = Arc::new(MockNetwork::online().with_status(&critical[1], 404));
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::constrained(critical), &network, &storage);

        let err = sw.install().await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_activate_purges_stale_buckets_and_claims() {
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.open("vechnost-images-ultra-v0.9").await.unwrap();
        storage.open("vechnost-safari-v1").await.unwrap();
        storage.open("vechnost-ultra-v1.0").await.unwrap();

        let clients = Clients::new();
        let page = clients.register();
        let sw = ServiceWorker::new(
            WorkerConfig::full(urls("u", 3)),
            network,
            storage.clone(),
            clients.clone(),
        )
        .unwrap();

        let report = sw.start().await.unwrap();
        assert_eq!(
            report,
            ActivationReport {
                deleted_buckets: 2,
                claimed_clients: 1
            }
        );

        let mut remaining = storage.keys().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["vechnost-images-ultra-v1.0", "vechnost-ultra-v1.0"]);
        assert_eq!(clients.controller(page).as_deref(), Some("vechnost-images-ultra-v1.0"));
        assert_eq!(sw.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let critical = urls("s", 1);
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::constrained(critical.clone()), &network, &storage);
        sw.start().await.unwrap();
        let calls = network.calls();

        network.set_online(false);
        let FetchOutcome::Respond(response) =
            sw.handle_fetch(&FetchRequest::image(critical[0].clone())).await.unwrap()
        else {
            panic!("image request not intercepted");
        };

        assert_eq!(network.calls(), calls);
        assert_eq!(response.text().unwrap(), format!("body:{}", critical[0]));
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_and_stores() {
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::constrained(Vec::new()), &network, &storage);
        sw.start().await.unwrap();

        let url = "https://i.imgur.com/new.png";
        let outcome = sw.handle_fetch(&FetchRequest::new(url)).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Respond(_)));
        assert!(storage.match_in("vechnost-images-safari-v1", url).await.unwrap().is_some());

        // Second request is served from the bucket
        network.set_online(false);
        let FetchOutcome::Respond(response) = sw.handle_fetch(&FetchRequest::new(url)).await.unwrap()
        else {
            panic!("image request not intercepted");
        };
        assert_eq!(response.content_type(), Some("image/jpeg"));
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_disk_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(
            crate::storage::DiskCacheStorage::new(crate::storage::DiskCacheConfig::at(dir.path()))
                .unwrap(),
        );
        let sw =
            ServiceWorker::new(WorkerConfig::constrained(Vec::new()), network.clone(), storage, Clients::new())
                .unwrap();
        sw.start().await.unwrap();

        let url = "https://i.imgur.com/new.png";
        sw.handle_fetch(&FetchRequest::image(url)).await.unwrap();

        // Garble the size field of every stored entry
        for file in std::fs::read_dir(dir.path().join("vechnost-images-safari-v1")).unwrap() {
            let path = file.unwrap().path();
            let mut bytes = std::fs::read(&path).unwrap();
            bytes[12..20].copy_from_slice(&u64::MAX.to_le_bytes());
            std::fs::write(&path, &bytes).unwrap();
        }

        let FetchOutcome::Respond(response) = sw.handle_fetch(&FetchRequest::image(url)).await.unwrap()
        else {
            panic!("image request not intercepted");
        };
        assert_eq!(response.text().unwrap(), format!("body:{url}"));
        assert_eq!(network.calls(), 2);

        // The refetch replaced the bad entry
        network.set_online(false);
        let FetchOutcome::Respond(response) = sw.handle_fetch(&FetchRequest::image(url)).await.unwrap()
        else {
            panic!("image request not intercepted");
        };
        assert_eq!(response.text().unwrap(), format!("body:{url}"));
        assert_eq!(network.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_yields_placeholder() {
        for config in [WorkerConfig::constrained(Vec::new()), WorkerConfig::full(Vec::new())] {
            let network = Arc::new(MockNetwork::online());
            let storage = Arc::new(MemoryCacheStorage::new());
            let sw = worker(config, &network, &storage);
            sw.start().await.unwrap();
            network.set_online(false);

            let FetchOutcome::Respond(response) = sw
                .handle_fetch(&FetchRequest::image("https://i.imgur.com/gone.gif"))
                .await
                .unwrap()
            else {
                panic!("image request not intercepted");
            };

            assert_eq!(response.content_type(), Some(PLACEHOLDER_CONTENT_TYPE));
            assert_eq!(response.text().unwrap(), PLACEHOLDER_SVG);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_a_miss() {
        let network = Arc::new(MockNetwork::online());
        let sw = ServiceWorker::new(
            WorkerConfig::constrained(Vec::new()),
            network.clone(),
            Arc::new(FailingStorage),
            Clients::new(),
        )
        .unwrap();
        sw.set_state(WorkerState::Installed);
        // Activation cannot list buckets
        assert!(matches!(sw.activate().await, Err(WorkerError::Storage(_))));
        sw.set_state(WorkerState::Active);

        let url = "https://i.imgur.com/a.png";
        let FetchOutcome::Respond(response) = sw.handle_fetch(&FetchRequest::image(url)).await.unwrap()
        else {
            panic!("image request not intercepted");
        };
        assert_eq!(response.text().unwrap(), format!("body:{url}"));
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_images_per_variant() {
        let page = FetchRequest::new("https://vechnost.store/index.html");

        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let constrained = worker(WorkerConfig::constrained(Vec::new()), &network, &storage);
        constrained.start().await.unwrap();
        assert!(matches!(
            constrained.handle_fetch(&page).await.unwrap(),
            FetchOutcome::Passthrough
        ));

        let storage = Arc::new(MemoryCacheStorage::new());
        let full = worker(WorkerConfig::full(Vec::new()), &network, &storage);
        full.start().await.unwrap();
        assert!(matches!(
            full.handle_fetch(&page).await.unwrap(),
            FetchOutcome::Respond(_)
        ));
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_any_bucket() {
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::full(Vec::new()), &network, &storage);
        sw.start().await.unwrap();

        let page = FetchRequest::new("https://vechnost.store/index.html");
        let stored = Response::synthesized(StatusCode::OK, "text/html", "<html>saved</html>");
        storage
            .put("vechnost-ultra-v1.0", CachedResponse::from_response(&page.url, &stored))
            .await
            .unwrap();

        network.set_online(false);
        let FetchOutcome::Respond(response) = sw.handle_fetch(&page).await.unwrap() else {
            panic!("page request not intercepted");
        };
        assert_eq!(response.text().unwrap(), "<html>saved</html>");

        let missing = FetchRequest::new("https://vechnost.store/other.html");
        assert!(matches!(
            sw.handle_fetch(&missing).await,
            Err(WorkerError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_worker_passes_through() {
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let sw = worker(WorkerConfig::full(Vec::new()), &network, &storage);

        let image = FetchRequest::image("https://i.imgur.com/a.png");
        assert!(matches!(sw.handle_fetch(&image).await.unwrap(), FetchOutcome::Passthrough));

        sw.start().await.unwrap();
        sw.supersede();
        assert!(matches!(sw.handle_fetch(&image).await.unwrap(), FetchOutcome::Passthrough));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_cache_batches() {
        let known = urls("u", 12);
        let network = Arc::new(MockNetwork::online().failing_for(&known[7]).with_status(&known[3], 500));
        let storage = Arc::new(MemoryCacheStorage::new());
        let mut config = WorkerConfig::full(known.clone());
        config.critical_images.truncate(2);
        let sw = worker(config, &network, &storage);
        sw.start().await.unwrap();
        network.clear_log();

        let start = tokio::time::Instant::now();
        let report = sw.handle_message(&WorkerMessage::CacheImagesNow).await.unwrap();

        // no-cors responses are opaque, so the 500 is stored too
        assert_eq!(
            report,
            BulkCacheReport {
                requested: 12,
                cached: 11,
                failed: 1
            }
        );

        let log = network.log();
        assert_eq!(log.len(), 12);
        assert!(log.iter().all(|(_, mode, _)| *mode == RequestMode::NoCors));

        // Batches of 5 start 100ms apart, no delay after the last
        let offsets: Vec<Duration> = log.iter().map(|(_, _, at)| *at - start).collect();
        assert!(offsets[..5].iter().all(|d| *d == Duration::ZERO));
        assert!(offsets[5..10].iter().all(|d| *d == Duration::from_millis(100)));
        assert!(offsets[10..].iter().all(|d| *d == Duration::from_millis(200)));
        assert_eq!(start.elapsed(), Duration::from_millis(200));

        let stored = storage.match_in("vechnost-images-ultra-v1.0", &known[11]).await.unwrap().unwrap();
        assert_eq!(stored.response_type, ResponseType::Opaque);
        assert!(storage.match_in("vechnost-images-ultra-v1.0", &known[7]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_cache_triggers() {
        let network = Arc::new(MockNetwork::online());
        let storage = Arc::new(MemoryCacheStorage::new());
        let full = worker(WorkerConfig::full(urls("u", 3)), &network, &storage);
        full.start().await.unwrap();

        assert!(full.handle_sync(CACHE_ALL_IMAGES_TAG).await.is_some());
        assert!(full.handle_sync("something-else").await.is_none());

        let constrained = worker(WorkerConfig::constrained(Vec::new()), &network, &storage);
        assert!(matches!(
            constrained.cache_all_images().await,
            Err(WorkerError::Unsupported(_, WorkerVariant::Constrained))
        ));
        assert!(constrained.handle_message(&WorkerMessage::CacheImagesNow).await.is_none());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = WorkerConfig::full(Vec::new());
        config.bulk_batch_size = 0;
        let result = ServiceWorker::new(
            config,
            Arc::new(MockNetwork::online()),
            Arc::new(MemoryCacheStorage::new()),
            Clients::new(),
        );
        assert!(matches!(result, Err(WorkerError::Config(ConfigError::EmptyBatch))));
    }
}
