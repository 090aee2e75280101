//! Browser capability profile
//!
//! Detected once from the identity string and touch signal the host
//! reports, then shared read-only for the rest of the session.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Environment variable overriding the reported user agent
pub const USER_AGENT_VAR: &str = "VECHNOST_USER_AGENT";

/// Environment variable carrying the reported touch point count
pub const TOUCH_POINTS_VAR: &str = "VECHNOST_TOUCH_POINTS";

/// Rendering engine family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineFamily {
    /// WebKit without a Chromium token (desktop Safari, every iOS browser)
    Safari,
    /// Blink-based (Chrome, Edge, Opera, Samsung Internet)
    Chromium,
    /// Gecko
    Firefox,
    /// Anything unrecognized
    Other,
}

/// What the host reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEnvironment {
    /// `navigator.userAgent`
    pub user_agent: String,
    /// `navigator.maxTouchPoints`
    pub max_touch_points: u32,
}

impl HostEnvironment {
    pub fn new(user_agent: impl Into<String>, max_touch_points: u32) -> Self {
        Self {
            user_agent: user_agent.into(),
            max_touch_points,
        }
    }

    /// Read the environment from `VECHNOST_USER_AGENT` / `VECHNOST_TOUCH_POINTS`
    pub fn from_env() -> Self {
        Self {
            user_agent: env::var(USER_AGENT_VAR).unwrap_or_default(),
            max_touch_points: env::var(TOUCH_POINTS_VAR)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        }
    }
}

/// Immutable capability profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub engine: EngineFamily,
    pub is_touch_device: bool,
    pub is_ios: bool,
    pub is_android: bool,
}

static CURRENT: Lazy<BrowserProfile> = Lazy::new(|| {
    let profile = BrowserProfile::detect(&HostEnvironment::from_env());
    info!(
        "Browser detection: {:?} (touch: {}, ios: {}, android: {})",
        profile.engine, profile.is_touch_device, profile.is_ios, profile.is_android
    );
    profile
});

impl BrowserProfile {
    /// Classify a host. Pure; Chromium wins when several patterns match.
    pub fn detect(env: &HostEnvironment) -> Self {
        let ua = env.user_agent.as_str();
        let lower = ua.to_ascii_lowercase();

        let is_chromium = lower.contains("chrome") || lower.contains("chromium");
        let is_firefox = lower.contains("firefox");
        let is_ios = ua.contains("iPad") || ua.contains("iPhone") || ua.contains("iPod");
        let is_android = lower.contains("android");

        let engine = if is_chromium {
            EngineFamily::Chromium
        } else if is_safari(&lower) {
            EngineFamily::Safari
        } else if is_firefox {
            EngineFamily::Firefox
        } else {
            EngineFamily::Other
        };

        Self {
            engine,
            is_touch_device: env.max_touch_points > 0 || is_ios || is_android,
            is_ios,
            is_android,
        }
    }

    /// Profile of this process, detected on first use from the environment
    pub fn current() -> &'static BrowserProfile {
        &CURRENT
    }

    /// Safari-class engines get the constrained loader and worker
    pub fn is_constrained(&self) -> bool {
        self.engine == EngineFamily::Safari
    }
}

/// `safari` present with no `chrome` or `android` token ahead of it
fn is_safari(lower: &str) -> bool {
    match lower.find("safari") {
        Some(pos) => {
            let prefix = &lower[..pos];
            !prefix.contains("chrome") && !prefix.contains("android")
        }
        None => false,
    }
}
