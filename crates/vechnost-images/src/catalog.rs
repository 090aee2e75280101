//! Storefront image manifest and the instant-load sequence
//!
//! The manifest lists which images the page warms first, which it warms in
//! the background, and which the service worker variants keep offline.

use crate::queue::{ImagePreloader, PreloadReport};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.json");

/// Pause between the critical phase and background product warming
pub const BACKGROUND_PRELOAD_DELAY: Duration = Duration::from_millis(1000);

/// Manifest errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Images the service workers keep offline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineManifest {
    /// Every known image, walked by the full worker's bulk job
    pub full: Vec<String>,
    /// Precache set of the constrained worker
    pub constrained: Vec<String>,
}

/// Storefront image manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Banner, logo, flash-sale and best-seller images, painted first
    pub critical: Vec<String>,
    /// Every product card image
    pub products: Vec<String>,
    #[serde(default)]
    pub offline: OfflineManifest,
}

impl Catalog {
    /// The storefront's own manifest
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_CATALOG).expect("built-in catalog is valid")
    }

    /// Parse a manifest, dropping repeated URLs
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let mut catalog: Catalog = serde_json::from_str(json)?;
        dedup(&mut catalog.critical);
        dedup(&mut catalog.products);
        dedup(&mut catalog.offline.full);
        dedup(&mut catalog.offline.constrained);
        Ok(catalog)
    }

    /// Read a manifest from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Keep the first occurrence of every URL
fn dedup(urls: &mut Vec<String>) {
    let mut seen = HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
}

/// A running instant-load sequence
pub struct WarmUp {
    /// Result of the critical phase, already finished
    pub critical: PreloadReport,
    background: JoinHandle<PreloadReport>,
}

impl WarmUp {
    /// Wait for background product warming to finish
    pub async fn finish(self) -> PreloadReport {
        match self.background.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Background preload aborted: {}", e);
                PreloadReport::default()
            }
        }
    }
}

/// Warm critical images, then product images in the background after
/// `background_delay`
pub async fn warm_up(
    preloader: &ImagePreloader,
    catalog: &Catalog,
    background_delay: Duration,
) -> WarmUp {
    info!("Starting instant load sequence ({} critical images)", catalog.critical.len());
    let critical = preloader.preload_many(catalog.critical.clone()).await;

    let loader = preloader.clone();
    let products = catalog.products.clone();
    let background = tokio::spawn(async move {
        tokio::time::sleep(background_delay).await;
        let report = loader.preload_many(products).await;
        info!("All product images preloaded ({}/{})", report.loaded, report.requested);
        report
    });

    WarmUp { critical, background }
}
