//! Media Cache Gateway
//!
//! Read-through cache of materialized media keyed by entity id.
//!
//! # Usage by the repository
//!
//! - `get` by id: consult the cache, load on a miss and populate the cache
//! - `get_all` / `get_all_versions`: rows whose id and version match a cached
//!   instance reuse that instance instead of being materialized; `get_all`
//!   caches what it loaded
//! - ad-hoc queries, paged listings, version lookups and rebuilds never touch
//!   the cache
//!
//! Its own writes keep the cache current: a save re-caches the saved item, a
//! move clears everything (descendant paths changed) and a delete removes the
//! deleted ids. Writes made around the repository are the caller's to
//! invalidate with [`MediaCache::remove`] or [`MediaCache::clear`].
//!
//! # Disabled cache
//!
//! [`DisabledMediaCache`] always misses and ignores inserts. Sub-stores that must
//! not see or leave cached copies (the snapshot rebuild) use it.

use crate::models::Media;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache of materialized media, keyed by id
#[async_trait]
pub trait MediaCache: Send + Sync {
    /// Cached copy of the item, if any
    async fn get(&self, id: i64) -> Option<Media>;

    /// Store a copy of the item under its id
    async fn insert(&self, media: &Media);

    /// Drop the cached copy of one item
    async fn remove(&self, id: i64);

    /// Drop everything
    async fn clear(&self);

    /// Whether this cache can ever return a hit
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Process-local media cache
#[derive(Debug, Default)]
pub struct InMemoryMediaCache {
    /// Map: media id → cached item
    entries: Arc<RwLock<HashMap<i64, Media>>>,

    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl InMemoryMediaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cache statistics (for debugging/monitoring)
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            hits: self.hits.load(Ordering::Acquire),
            misses: self.misses.load(Ordering::Acquire),
        }
    }
}

#[async_trait]
impl MediaCache for InMemoryMediaCache {
    async fn get(&self, id: i64) -> Option<Media> {
        let entries = self.entries.read().await;
        match entries.get(&id) {
            Some(media) => {
                self.hits.fetch_add(1, Ordering::AcqRel);
                Some(media.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::AcqRel);
                None
            }
        }
    }

    async fn insert(&self, media: &Media) {
        if !media.has_identity() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(media.id(), media.clone());
    }

    async fn remove(&self, id: i64) {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

/// Cache that never holds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMediaCache;

#[async_trait]
impl MediaCache for DisabledMediaCache {
    async fn get(&self, _id: i64) -> Option<Media> {
        None
    }

    async fn insert(&self, _media: &Media) {}

    async fn remove(&self, _id: i64) {}

    async fn clear(&self) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Statistics about the media cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached items
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: usize,
    /// Lookups that found nothing
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    fn saved_media(id: i64) -> Media {
        let mut media = Media::new("Photo", None, Arc::new(ContentType::new(1, "image", "Image")));
        media.set_identity(id);
        media
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let cache = InMemoryMediaCache::new();
        assert!(cache.get(5).await.is_none());

        cache.insert(&saved_media(5)).await;
        assert_eq!(cache.get(5).await.map(|m| m.id()), Some(5));

        cache.remove(5).await;
        assert!(cache.get(5).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_unsaved_media_is_not_cached() {
        let cache = InMemoryMediaCache::new();
        let unsaved = Media::new("Draft", None, Arc::new(ContentType::new(1, "image", "Image")));
        cache.insert(&unsaved).await;
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = DisabledMediaCache;
        cache.insert(&saved_media(7)).await;
        assert!(cache.get(7).await.is_none());
        assert!(!cache.is_enabled());
    }
}
