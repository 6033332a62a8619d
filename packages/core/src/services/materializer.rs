//! Batch materialization
//!
//! Turns decoded base rows into [`Media`] instances:
//!
//! 1. rows whose id and version match a cached item reuse that item
//! 2. every other row resolves its content type (memoized per batch) and
//!    becomes a [`DocumentDefinition`]
//! 3. one property statement loads all definitions
//! 4. collections are attached through an index keyed by (id, version), and
//!    each item's change record is cleared
//!
//! Output order always equals input row order.

use crate::db::QueryMetrics;
use crate::models::{ContentType, Media, PropertyCollection};
use crate::services::cache::MediaCache;
use crate::services::content_types::ContentTypeProvider;
use crate::services::property_loader::{load_properties, DocumentDefinition, DocumentKey};
use crate::services::select::BaseRow;
use crate::services::RepositoryError;
use libsql::Connection;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-batch memo of resolved content types
///
/// Providers return detached copies; the memo makes every item of a batch
/// that shares a content type share one `Arc` of it.
pub(crate) struct ContentTypeMemo<'a> {
    provider: &'a dyn ContentTypeProvider,
    resolved: HashMap<i64, Arc<ContentType>>,
}

impl<'a> ContentTypeMemo<'a> {
    pub fn new(provider: &'a dyn ContentTypeProvider) -> Self {
        Self {
            provider,
            resolved: HashMap::new(),
        }
    }

    /// Resolve a content type, asking the provider at most once per id
    pub async fn resolve(&mut self, id: i64) -> Result<Arc<ContentType>, RepositoryError> {
        if let Some(content_type) = self.resolved.get(&id) {
            return Ok(Arc::clone(content_type));
        }

        let content_type = self
            .provider
            .get(id)
            .await
            .map_err(RepositoryError::Collaborator)?
            .ok_or(RepositoryError::ContentTypeNotFound { id })?;
        let content_type = Arc::new(content_type);
        self.resolved.insert(id, Arc::clone(&content_type));

        Ok(content_type)
    }
}

/// Builds media instances from base rows
pub(crate) struct Materializer<'a> {
    conn: &'a Connection,
    content_types: &'a dyn ContentTypeProvider,
    cache: &'a dyn MediaCache,
    metrics: &'a QueryMetrics,
}

impl<'a> Materializer<'a> {
    pub fn new(
        conn: &'a Connection,
        content_types: &'a dyn ContentTypeProvider,
        cache: &'a dyn MediaCache,
        metrics: &'a QueryMetrics,
    ) -> Self {
        Self {
            conn,
            content_types,
            cache,
            metrics,
        }
    }

    /// Materialize `rows` in order
    ///
    /// With `use_cache`, rows matching a cached item by id and version reuse it.
    pub async fn materialize(
        &self,
        rows: Vec<BaseRow>,
        use_cache: bool,
    ) -> Result<Vec<Media>, RepositoryError> {
        let use_cache = use_cache && self.cache.is_enabled();
        let mut memo = ContentTypeMemo::new(self.content_types);
        let mut items = Vec::with_capacity(rows.len());
        let mut pending = Vec::new();
        let mut definitions = Vec::new();

        for row in rows {
            if use_cache {
                if let Some(cached) = self.cache.get(row.record.id).await {
                    if cached.version_id() == row.record.version_id {
                        items.push(cached);
                        continue;
                    }
                }
            }

            let content_type = memo.resolve(row.content_type_id).await?;
            definitions.push(DocumentDefinition {
                id: row.record.id,
                version_id: row.record.version_id,
                version_date: row.record.version_date,
                create_date: row.record.create_date,
                content_type: Arc::clone(&content_type),
            });
            pending.push(items.len());
            items.push(Media::from_record(row.record, content_type));
        }

        let loaded = load_properties(self.conn, &definitions, self.metrics).await?;
        attach_properties(&mut items, &pending, &definitions, loaded)?;

        Ok(items)
    }
}

/// Attach loaded collections to the items at `pending` positions
///
/// Every definition must match at least one pending item; a definition with no
/// matching item means the batch lost its consistency.
pub(crate) fn attach_properties(
    items: &mut [Media],
    pending: &[usize],
    definitions: &[DocumentDefinition],
    loaded: HashMap<DocumentKey, PropertyCollection>,
) -> Result<(), RepositoryError> {
    let mut index: HashMap<DocumentKey, Vec<usize>> = HashMap::with_capacity(pending.len());
    for &position in pending {
        let media = &items[position];
        let key = DocumentKey {
            id: media.id(),
            version_id: media.version_id(),
        };
        index.entry(key).or_default().push(position);
    }

    for definition in definitions {
        let key = definition.key();
        let positions = index.get(&key).ok_or_else(|| {
            RepositoryError::structural(format!(
                "No base row for properties of media {} version {}",
                key.id, key.version_id
            ))
        })?;

        let properties = loaded.get(&key).cloned().unwrap_or_else(|| {
            PropertyCollection::for_content_type(
                &definition.content_type,
                definition.version_id,
            )
        });
        for &position in positions {
            let media = &mut items[position];
            media.attach_properties(properties.clone());
            media.reset_dirty_properties();
        }
    }

    Ok(())
}
