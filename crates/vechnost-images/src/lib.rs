//! Vechnost Images - page-side image warming
//!
//! Implements the catalog page's image pipeline:
//! - Browser capability profile, detected once per process
//! - Profile-derived loader configuration shared with the renderer
//! - Bounded-concurrency preload queue with in-flight de-duplication
//! - The storefront manifest and its instant-load sequence
//!
//! # Profile Tuning
//!
//! | Engine | Parallel loads | Batch size | Batch pacing |
//! |--------|----------------|------------|--------------|
//! | Safari-class | 3 | 2 | 50 ms |
//! | Chromium-class | 10 | 5 | none |
//! | Other | 5 | 5 | none |

mod catalog;
mod config;
mod decode;
mod profile;
mod queue;

#[cfg(test)]
mod test_support;

pub use catalog::{warm_up, Catalog, CatalogError, OfflineManifest, WarmUp, BACKGROUND_PRELOAD_DELAY};
pub use config::{ConfigError, CrossOrigin, DecodingHint, LoaderConfig, LoadingHint};
pub use decode::DecodedImage;
pub use profile::{BrowserProfile, EngineFamily, HostEnvironment, TOUCH_POINTS_VAR, USER_AGENT_VAR};
pub use queue::{Completion, ImageHandle, ImagePreloader, LoadError, PreloadReport, QueueStats};
