//! In-process cache buckets

use super::{CacheStorage, CachedResponse, StorageError, validate_bucket_name};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct Buckets {
    /// Bucket names in creation order
    order: Vec<String>,
    entries: HashMap<String, HashMap<String, CachedResponse>>,
}

impl Buckets {
    fn bucket_mut(&mut self, name: &str) -> &mut HashMap<String, CachedResponse> {
        if !self.entries.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.entries.entry(name.to_string()).or_default()
    }
}

/// Cache storage that lives as long as the process
#[derive(Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<Buckets>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Buckets) -> T) -> T {
        f(&self.buckets.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Buckets) -> T) -> T {
        f(&mut self.buckets.write().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.write(|b| {
            b.bucket_mut(bucket);
        });
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read(|b| b.order.clone()))
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.write(|b| {
            b.order.retain(|name| name != bucket);
            b.entries.remove(bucket).is_some()
        }))
    }

    async fn put(&self, bucket: &str, entry: CachedResponse) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.write(|b| {
            b.bucket_mut(bucket).insert(entry.url.clone(), entry);
        });
        Ok(())
    }

    async fn put_all(&self, bucket: &str, entries: Vec<CachedResponse>) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.write(|b| {
            let target = b.bucket_mut(bucket);
            for entry in entries {
                target.insert(entry.url.clone(), entry);
            }
        });
        Ok(())
    }

    async fn match_in(&self, bucket: &str, url: &str) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self.read(|b| b.entries.get(bucket).and_then(|entries| entries.get(url)).cloned()))
    }

    async fn urls(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.read(|b| {
            let mut urls: Vec<String> = b
                .entries
                .get(bucket)
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default();
            urls.sort();
            urls
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vechnost_network::ResponseType;

    fn entry(url: &str) -> CachedResponse {
        CachedResponse {
            url: url.to_string(),
            status: 200,
            content_type: None,
            response_type: ResponseType::Opaque,
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_creation_order_and_replace() {
        let storage = MemoryCacheStorage::new();
        storage.put("second", entry("https://x/a")).await.unwrap();
        storage.open("first").await.unwrap();
        storage.put("second", entry("https://x/a")).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["second", "first"]);
        assert_eq!(storage.urls("second").await.unwrap(), vec!["https://x/a"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryCacheStorage::new();
        storage.put_all("old", vec![entry("https://x/a"), entry("https://x/b")]).await.unwrap();

        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.match_any("https://x/a").await.unwrap().is_none());
    }
}
