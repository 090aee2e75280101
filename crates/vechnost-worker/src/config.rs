//! Worker configuration per variant

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use vechnost_network::{FetchRequest, ResourceType};

pub const CONSTRAINED_METADATA_BUCKET: &str = "vechnost-safari-v1";
pub const CONSTRAINED_IMAGE_BUCKET: &str = "vechnost-images-safari-v1";
pub const FULL_METADATA_BUCKET: &str = "vechnost-ultra-v1.0";
pub const FULL_IMAGE_BUCKET: &str = "vechnost-images-ultra-v1.0";

/// How many of the known images the full worker precaches at install
pub const FULL_CRITICAL_COUNT: usize = 15;

const BULK_BATCH_SIZE: usize = 5;
const BULK_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Bucket names must not be empty")]
    EmptyBucketName,

    #[error("Metadata and image buckets share the name {0:?}")]
    SharedBucket(String),

    #[error("Bulk batch size must be at least 1")]
    EmptyBatch,

    #[error("Unknown worker variant {0:?} (expected full or constrained)")]
    UnknownVariant(String),
}

/// Which worker to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerVariant {
    /// Small fixed precache, images only
    Constrained,
    /// Larger precache, bulk job, network-first for other requests
    Full,
}

impl fmt::Display for WorkerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerVariant::Constrained => write!(f, "constrained"),
            WorkerVariant::Full => write!(f, "full"),
        }
    }
}

impl FromStr for WorkerVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constrained" => Ok(WorkerVariant::Constrained),
            "full" => Ok(WorkerVariant::Full),
            _ => Err(ConfigError::UnknownVariant(s.to_string())),
        }
    }
}

/// Service worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub variant: WorkerVariant,
    /// Version tag kept alongside the image bucket
    pub metadata_bucket: String,
    /// Version tag holding cached image responses
    pub image_bucket: String,
    /// Precached at install, all or nothing
    pub critical_images: Vec<String>,
    /// Walked by the bulk job
    pub known_images: Vec<String>,
    pub bulk_batch_size: usize,
    pub bulk_batch_delay: Duration,
    /// Path extensions treated as images, compared case-insensitively
    pub image_extensions: Vec<String>,
}

impl WorkerConfig {
    /// Constrained worker precaching `critical_images`
    pub fn constrained(critical_images: Vec<String>) -> Self {
        Self {
            variant: WorkerVariant::Constrained,
            metadata_bucket: CONSTRAINED_METADATA_BUCKET.to_string(),
            image_bucket: CONSTRAINED_IMAGE_BUCKET.to_string(),
            critical_images,
            known_images: Vec::new(),
            bulk_batch_size: BULK_BATCH_SIZE,
            bulk_batch_delay: BULK_BATCH_DELAY,
            image_extensions: extensions(&["jpg", "jpeg", "png", "gif"]),
        }
    }

    /// Full worker over `known_images`, precaching the first
    /// [`FULL_CRITICAL_COUNT`]
    pub fn full(known_images: Vec<String>) -> Self {
        let critical_images = known_images.iter().take(FULL_CRITICAL_COUNT).cloned().collect();
        Self {
            variant: WorkerVariant::Full,
            metadata_bucket: FULL_METADATA_BUCKET.to_string(),
            image_bucket: FULL_IMAGE_BUCKET.to_string(),
            critical_images,
            known_images,
            bulk_batch_size: BULK_BATCH_SIZE,
            bulk_batch_delay: BULK_BATCH_DELAY,
            image_extensions: extensions(&["jpg", "jpeg", "png", "gif", "webp"]),
        }
    }

    /// The buckets activation keeps
    pub fn retained_buckets(&self) -> [&str; 2] {
        [&self.metadata_bucket, &self.image_bucket]
    }

    /// Whether non-image requests go network-first through the worker
    pub fn intercepts_non_images(&self) -> bool {
        self.variant == WorkerVariant::Full
    }

    pub fn supports_bulk_cache(&self) -> bool {
        self.variant == WorkerVariant::Full
    }

    /// Image by destination or by path extension
    pub fn is_image_request(&self, request: &FetchRequest) -> bool {
        request.destination == ResourceType::Image || request.has_extension(&self.image_extensions)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metadata_bucket.is_empty() || self.image_bucket.is_empty() {
            return Err(ConfigError::EmptyBucketName);
        }
        if self.metadata_bucket == self.image_bucket {
            return Err(ConfigError::SharedBucket(self.image_bucket.clone()));
        }
        if self.supports_bulk_cache() && self.bulk_batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        Ok(())
    }
}

fn extensions(list: &[&str]) -> Vec<String> {
    list.iter().map(|e| e.to_string()).collect()
}
