//! Vechnost Worker - offline image cache
//!
//! One configurable service worker with two variants:
//! - **Constrained**: precaches a small fixed image set, intercepts images only
//! - **Full**: precaches the first images of the known list, answers other
//!   requests network-first and runs a batched background job over every
//!   known image
//!
//! Images are served cache-first from a versioned bucket. When the network
//! fails a placeholder SVG is returned instead of an error. Activation
//! deletes every bucket but the current version tags.
//!
//! The worker runs as its own task ([`spawn_worker`]); pages talk to it
//! through fire-and-forget messages and reach it for fetches through
//! [`ControlledFetcher`].

mod clients;
mod config;
mod controlled;
mod message;
mod placeholder;
mod runtime;
mod storage;
mod worker;

#[cfg(test)]
mod test_support;

pub use clients::{ClientId, Clients};
pub use config::{
    ConfigError, FULL_CRITICAL_COUNT, WorkerConfig, WorkerVariant, CONSTRAINED_IMAGE_BUCKET,
    CONSTRAINED_METADATA_BUCKET, FULL_IMAGE_BUCKET, FULL_METADATA_BUCKET,
};
pub use controlled::ControlledFetcher;
pub use message::{CACHE_ALL_IMAGES_TAG, ClientEvent, WorkerEvent, WorkerMessage};
pub use placeholder::{PLACEHOLDER_CONTENT_TYPE, PLACEHOLDER_SVG, placeholder_response};
pub use runtime::{WorkerHandle, spawn_worker};
pub use storage::{
    CacheStorage, CachedResponse, DiskCacheConfig, DiskCacheStorage, MemoryCacheStorage,
    StorageError,
};
pub use worker::{
    ActivationReport, BulkCacheReport, FetchOutcome, ServiceWorker, WorkerError, WorkerState,
};
