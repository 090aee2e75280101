//! Message types for communication between pages and the worker.

use crate::worker::BulkCacheReport;
use serde::{Deserialize, Serialize};

/// Background sync tag that starts the bulk cache job
pub const CACHE_ALL_IMAGES_TAG: &str = "cache-all-images";

/// Messages a page may post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum WorkerMessage {
    /// Run the bulk cache job now
    #[serde(rename = "CACHE_IMAGES_NOW")]
    CacheImagesNow,
}

impl WorkerMessage {
    /// Parse a posted JSON message. Unknown shapes yield `None`.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// Events delivered to the worker's event loop.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Precache critical images, then activate
    Install,
    /// Purge stale buckets and claim clients
    Activate,
    /// Page message
    Message(WorkerMessage),
    /// Background sync fired
    Sync { tag: String },
    /// Graceful shutdown request
    Shutdown,
}

/// Events the worker reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Critical images stored
    Installed { precached: usize },
    /// Install failed; the worker is redundant
    InstallFailed { error: String },
    /// Worker controls its clients
    Activated {
        deleted_buckets: usize,
        claimed_clients: usize,
    },
    ActivationFailed { error: String },
    /// A bulk cache job finished
    BulkCacheFinished(BulkCacheReport),
    /// Handling an event panicked
    Crashed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_shape() {
        assert_eq!(
            WorkerMessage::from_json(r#"{"action":"CACHE_IMAGES_NOW"}"#),
            Some(WorkerMessage::CacheImagesNow)
        );
        assert_eq!(
            serde_json::to_string(&WorkerMessage::CacheImagesNow).unwrap(),
            r#"{"action":"CACHE_IMAGES_NOW"}"#
        );
    }

    #[test]
    fn test_unknown_messages_ignored() {
        assert_eq!(WorkerMessage::from_json(r#"{"action":"CLEAR"}"#), None);
        assert_eq!(WorkerMessage::from_json(r#"{"type":"CACHE_IMAGES_NOW"}"#), None);
        assert_eq!(WorkerMessage::from_json("not json"), None);
    }
}
