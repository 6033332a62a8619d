//! Content type lookup
//!
//! The repository resolves type descriptors through [`ContentTypeProvider`].
//! Providers are expected to cache on their side; every call still returns a
//! detached copy, which is why the materializer memoizes per batch.

use crate::models::ContentType;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Source of content type descriptors
#[async_trait]
pub trait ContentTypeProvider: Send + Sync {
    /// Get a detached copy of a content type
    ///
    /// Returns `Ok(None)` for unknown ids.
    async fn get(&self, id: i64) -> anyhow::Result<Option<ContentType>>;
}

/// In-memory content type provider
///
/// Counts lookups so callers can observe how often descriptors are detached.
#[derive(Debug, Default)]
pub struct ContentTypeRegistry {
    types: RwLock<HashMap<i64, ContentType>>,
    lookups: AtomicUsize,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `types`
    pub fn with_types(types: impl IntoIterator<Item = ContentType>) -> Self {
        Self {
            types: RwLock::new(types.into_iter().map(|ct| (ct.id, ct)).collect()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Add or replace a content type
    pub async fn register(&self, content_type: ContentType) {
        let mut types = self.types.write().await;
        types.insert(content_type.id, content_type);
    }

    /// Number of `get` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ContentTypeProvider for ContentTypeRegistry {
    async fn get(&self, id: i64) -> anyhow::Result<Option<ContentType>> {
        self.lookups.fetch_add(1, Ordering::AcqRel);
        let types = self.types.read().await;
        Ok(types.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = ContentTypeRegistry::with_types([ContentType::new(1, "folder", "Folder")]);

        assert!(registry.get(1).await.unwrap().is_some());
        assert!(registry.get(2).await.unwrap().is_none());
        assert_eq!(registry.lookup_count(), 2);

        registry.register(ContentType::new(2, "image", "Image")).await;
        assert_eq!(registry.get(2).await.unwrap().unwrap().alias, "image");
    }
}
