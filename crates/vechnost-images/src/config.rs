//! Image loader configuration
//!
//! Tuning values derived from the [`BrowserProfile`]. The renderer reads
//! the same values to set `loading`, `decoding` and `crossorigin` on the
//! elements it paints.

use crate::profile::{BrowserProfile, EngineFamily};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vechnost_network::RequestMode;

/// When the decoded bitmap is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodingHint {
    /// Decode on the loading task
    Sync,
    /// Decode off the async runtime
    Async,
}

impl DecodingHint {
    /// Attribute value for `<img decoding>`
    pub fn as_attribute(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

/// `<img loading>` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingHint {
    Eager,
    Lazy,
}

impl LoadingHint {
    pub fn as_attribute(&self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
        }
    }
}

/// `<img crossorigin>` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossOrigin {
    /// No attribute: cross-origin images load opaque
    None,
    /// `anonymous`: CORS request without credentials
    Anonymous,
}

impl CrossOrigin {
    /// Fetch mode an image element with this attribute uses
    pub fn request_mode(&self) -> RequestMode {
        match self {
            Self::None => RequestMode::NoCors,
            Self::Anonymous => RequestMode::Cors,
        }
    }
}

/// Profile-derived loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Engine the values were derived for
    pub engine: EngineFamily,

    /// Maximum loads in flight at once, across all batches
    pub max_parallel_loads: usize,

    /// URLs issued together by `preload_many`
    pub batch_size: usize,

    /// Pause between batch issuances (zero disables pacing)
    pub inter_batch_delay: Duration,

    /// Decoding strategy
    pub decoding_hint: DecodingHint,

    /// Loading attribute for painted elements
    pub loading_hint: LoadingHint,

    /// CORS attribute for preloads and painted elements
    pub cross_origin: CrossOrigin,
}

impl LoaderConfig {
    /// Derive the configuration for a profile
    pub fn for_profile(profile: &BrowserProfile) -> Self {
        match profile.engine {
            EngineFamily::Safari => Self::constrained(),
            EngineFamily::Chromium => Self::aggressive(),
            EngineFamily::Firefox | EngineFamily::Other => Self {
                engine: profile.engine,
                ..Self::balanced()
            },
        }
    }

    /// Safari-class: few parallel loads, small paced batches
    pub fn constrained() -> Self {
        Self {
            engine: EngineFamily::Safari,
            max_parallel_loads: 3,
            batch_size: 2,
            inter_batch_delay: Duration::from_millis(50),
            decoding_hint: DecodingHint::Async,
            loading_hint: LoadingHint::Eager,
            cross_origin: CrossOrigin::Anonymous,
        }
    }

    /// Chromium-class: wide parallelism, unpaced
    pub fn aggressive() -> Self {
        Self {
            engine: EngineFamily::Chromium,
            max_parallel_loads: 10,
            batch_size: 5,
            inter_batch_delay: Duration::ZERO,
            decoding_hint: DecodingHint::Async,
            loading_hint: LoadingHint::Eager,
            cross_origin: CrossOrigin::Anonymous,
        }
    }

    /// Everything else
    pub fn balanced() -> Self {
        Self {
            engine: EngineFamily::Other,
            max_parallel_loads: 5,
            batch_size: 5,
            inter_batch_delay: Duration::ZERO,
            decoding_hint: DecodingHint::Async,
            loading_hint: LoadingHint::Eager,
            cross_origin: CrossOrigin::Anonymous,
        }
    }

    /// Classes the renderer adds to `<body>`
    pub fn body_classes(&self) -> &'static [&'static str] {
        match self.engine {
            EngineFamily::Safari => &["safari-browser"],
            EngineFamily::Chromium => &["chrome-browser"],
            _ => &[],
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_loads == 0 {
            return Err(ConfigError::NoParallelism);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::for_profile(BrowserProfile::current())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("max_parallel_loads must be at least 1")]
    NoParallelism,

    #[error("batch_size must be at least 1")]
    EmptyBatch,
}
