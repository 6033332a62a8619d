//! Media Repository - Retrieval and Persistence
//!
//! This module is the entry point for reading and writing media items:
//!
//! - Retrieval by id, by id list, by query, by version and paged
//! - Insert and update with tree maintenance (path, level, sort order)
//! - Sibling name uniqueness
//! - Version history (list, fetch, delete one version)
//! - Snapshot tables and their bulk rebuild
//!
//! # Batch loading
//!
//! Every read issues one base statement and, for the rows not served from the
//! cache, exactly one property statement. Reads never issue a statement per
//! item.
//!
//! # Writes
//!
//! Each write runs in its own transaction. An insert learns its id from the
//! node row, so the row is first written with its parent's path as a
//! placeholder and then updated to the final path once the id is known. Both
//! writes happen inside the transaction; the placeholder is never visible.
//!
//! # Cache
//!
//! `get` reads through the cache. `get_all` and `get_all_versions` reuse cached
//! items whose version matches the row. Queries, paged listings, version
//! lookups and rebuilds bypass it. A successful save re-caches the saved item;
//! a move clears the cache because descendants changed too.

use crate::config::RepositoryConfig;
use crate::db::rows::format_timestamp;
use crate::db::{DatabaseService, QueryMetrics, StatementKind};
use crate::models::{
    Media, MediaField, MediaQuery, Page, PagedQuery, ValidationError, MEDIA_OBJECT_TYPE,
    MEDIA_RECYCLE_BIN_ID,
};
use crate::services::cache::{DisabledMediaCache, InMemoryMediaCache, MediaCache};
use crate::services::content_types::ContentTypeProvider;
use crate::services::materializer::Materializer;
use crate::services::rebuild::{
    upsert_content_xml, upsert_preview_xml, RebuildReport, SnapshotRebuilder,
};
use crate::services::select::{count_rows, fetch_base_rows, json_list, like_escape, MediaSelect, SqlFilter};
use crate::services::tags::{NoopTagSynchronizer, TagSynchronizer};
use crate::services::tree::{self, validate_path};
use crate::services::unique_name::{fetch_similar_siblings, resolve_unique_name};
use crate::services::versions;
use crate::services::RepositoryError;
use chrono::Utc;
use libsql::params::Params;
use libsql::{params, Connection, Transaction, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default listing order for queries: tree depth, then sibling position
const QUERY_ORDER: &str = "n.level ASC, n.parent_id ASC, n.sort_order ASC, n.id ASC";

/// Stored tree position of an existing item
struct StoredPosition {
    parent_id: Option<i64>,
    path: String,
    level: i64,
    sort_order: i64,
    trashed: bool,
}

/// Builder for [`MediaRepository`]
///
/// A content type provider is required; the tag synchronizer defaults to a
/// no-op and the cache to an in-memory cache (or a disabled one when
/// `cache_enabled` is off).
pub struct MediaRepositoryBuilder {
    db: DatabaseService,
    content_types: Option<Arc<dyn ContentTypeProvider>>,
    tags: Option<Arc<dyn TagSynchronizer>>,
    cache: Option<Arc<dyn MediaCache>>,
    config: RepositoryConfig,
}

impl MediaRepositoryBuilder {
    pub fn content_types(mut self, provider: Arc<dyn ContentTypeProvider>) -> Self {
        self.content_types = Some(provider);
        self
    }

    pub fn tags(mut self, synchronizer: Arc<dyn TagSynchronizer>) -> Self {
        self.tags = Some(synchronizer);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn MediaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish construction
    ///
    /// # Errors
    ///
    /// - `MissingCollaborator` if no content type provider was supplied
    /// - `InvalidConfiguration` if the config does not validate
    pub fn build(self) -> Result<MediaRepository, RepositoryError> {
        let content_types = self
            .content_types
            .ok_or(RepositoryError::MissingCollaborator("content type provider"))?;
        self.config
            .validate()
            .map_err(RepositoryError::InvalidConfiguration)?;

        let cache = match self.cache {
            Some(cache) => cache,
            None if self.config.cache_enabled => Arc::new(InMemoryMediaCache::new()),
            None => Arc::new(DisabledMediaCache),
        };

        Ok(MediaRepository {
            db: self.db,
            content_types,
            tags: self.tags.unwrap_or_else(|| Arc::new(NoopTagSynchronizer)),
            cache,
            config: self.config,
            metrics: Arc::new(QueryMetrics::new()),
        })
    }
}

/// Repository of media items
///
/// # Examples
///
/// ```no_run
/// use mediastore_core::db::DatabaseService;
/// use mediastore_core::models::{ContentType, Media};
/// use mediastore_core::services::{ContentTypeRegistry, MediaRepository};
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = DatabaseService::new(PathBuf::from("./data/media.db")).await?;
///     let folder = ContentType::new(1031, "folder", "Folder");
///     let registry = Arc::new(ContentTypeRegistry::with_types([folder.clone()]));
///
///     let repository = MediaRepository::builder(&db).content_types(registry).build()?;
///
///     let mut media = Media::new("Holiday", None, Arc::new(folder));
///     repository.add_or_update(&mut media).await?;
///     println!("Saved media {} at {}", media.id(), media.path());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MediaRepository {
    db: DatabaseService,
    content_types: Arc<dyn ContentTypeProvider>,
    tags: Arc<dyn TagSynchronizer>,
    cache: Arc<dyn MediaCache>,
    config: RepositoryConfig,
    metrics: Arc<QueryMetrics>,
}

impl MediaRepository {
    /// Start building a repository over `db`
    pub fn builder(db: &DatabaseService) -> MediaRepositoryBuilder {
        MediaRepositoryBuilder {
            db: db.clone(),
            content_types: None,
            tags: None,
            cache: None,
            config: RepositoryConfig::default(),
        }
    }

    /// Statement counters of this repository
    pub fn metrics(&self) -> &QueryMetrics {
        &self.metrics
    }

    /// The cache this repository reads through
    pub fn cache(&self) -> &Arc<dyn MediaCache> {
        &self.cache
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Id of the media recycle bin container
    pub fn recycle_bin_id(&self) -> i64 {
        MEDIA_RECYCLE_BIN_ID
    }

    async fn connect(&self) -> Result<Connection, RepositoryError> {
        Ok(self.db.connect_with_timeout().await?)
    }

    fn materializer<'a>(&'a self, conn: &'a Connection) -> Materializer<'a> {
        Materializer::new(conn, &*self.content_types, &*self.cache, &self.metrics)
    }

    async fn load(
        &self,
        conn: &Connection,
        select: &MediaSelect,
        use_cache: bool,
    ) -> Result<Vec<Media>, RepositoryError> {
        let rows = fetch_base_rows(conn, select, &self.metrics).await?;
        let items = self.materializer(conn).materialize(rows, use_cache).await?;
        debug!("Materialized {} media items", items.len());
        Ok(items)
    }

    // ----------------------------------------------------------------------
    // Retrieval
    // ----------------------------------------------------------------------

    /// Get the current version of one item
    ///
    /// Served from the cache when present; a miss loads the item and caches it.
    /// Returns `Ok(None)` if no media item has this id.
    pub async fn get(&self, id: i64) -> Result<Option<Media>, RepositoryError> {
        if let Some(cached) = self.cache.get(id).await {
            debug!("Cache hit for media {}", id);
            return Ok(Some(cached));
        }

        let conn = self.connect().await?;
        let mut items = self.load(&conn, &versions::current_of(id), false).await?;
        let Some(media) = items.pop() else {
            return Ok(None);
        };

        self.cache.insert(&media).await;
        Ok(Some(media))
    }

    /// Get the current versions of several items, ordered by id
    ///
    /// An empty id list returns every media item. Missing ids are skipped.
    pub async fn get_all(&self, ids: &[i64]) -> Result<Vec<Media>, RepositoryError> {
        let filter = if ids.is_empty() {
            SqlFilter::new()
        } else {
            SqlFilter::new().and("n.id IN (SELECT value FROM json_each(?))", [json_list(ids)?])
        };

        let conn = self.connect().await?;
        let items = self.load(&conn, &MediaSelect::current(filter), true).await?;
        for media in &items {
            self.cache.insert(media).await;
        }
        Ok(items)
    }

    /// Get the current versions of every item matching `query`
    ///
    /// Items come back ordered by level, then by position among siblings.
    pub async fn get_by_query(&self, query: &MediaQuery) -> Result<Vec<Media>, RepositoryError> {
        let select = MediaSelect::current(SqlFilter::from_query(query)?).order_by(QUERY_ORDER);
        let conn = self.connect().await?;
        self.load(&conn, &select, false).await
    }

    /// Get every stored version of one item, newest first
    pub async fn get_all_versions(&self, id: i64) -> Result<Vec<Media>, RepositoryError> {
        let conn = self.connect().await?;
        self.load(&conn, &versions::all_of(id), true).await
    }

    /// Get one specific version of an item, current or historical
    pub async fn get_by_version(&self, version_id: Uuid) -> Result<Option<Media>, RepositoryError> {
        let conn = self.connect().await?;
        let mut items = self.load(&conn, &versions::by_version(version_id), false).await?;
        Ok(items.pop())
    }

    /// Get one page of items matching a paged query
    ///
    /// `total` counts every match of the query and name filter, independent of
    /// the page bounds.
    pub async fn get_paged(&self, paged: &PagedQuery) -> Result<Page<Media>, RepositoryError> {
        if paged.page_size == 0 {
            return Err(RepositoryError::invalid_operation(
                "Page size must be greater than 0",
            ));
        }

        let mut filter = SqlFilter::from_query(&paged.query)?;
        if let Some(text) = paged.filter.as_deref().filter(|t| !t.is_empty()) {
            filter = filter.and(
                "n.text LIKE ? ESCAPE '\\'",
                [Value::Text(format!("%{}%", like_escape(text)))],
            );
        }

        let select = MediaSelect::current(filter)
            .order_by_field(paged.order_by, paged.direction)
            .limit(paged.page_size)
            .offset(paged.page_index.saturating_mul(paged.page_size));

        let conn = self.connect().await?;
        let total = count_rows(&conn, &select, &self.metrics).await?;
        let items = if total == 0 {
            Vec::new()
        } else {
            self.load(&conn, &select, false).await?
        };

        Ok(Page {
            items,
            total,
            page_index: paged.page_index,
            page_size: paged.page_size,
        })
    }

    /// Whether a media item with this id exists
    pub async fn exists(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.connect().await?;
        self.metrics.record(StatementKind::Lookup);
        let mut rows = conn
            .query(
                "SELECT 1 FROM node WHERE id = ? AND node_object_type = ?",
                params![id, MEDIA_OBJECT_TYPE],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Number of items matching `query`
    pub async fn count(&self, query: &MediaQuery) -> Result<u64, RepositoryError> {
        let select = MediaSelect::current(SqlFilter::from_query(query)?);
        let conn = self.connect().await?;
        count_rows(&conn, &select, &self.metrics).await
    }

    // ----------------------------------------------------------------------
    // Persistence
    // ----------------------------------------------------------------------

    /// Insert a new item or update an existing one
    pub async fn add_or_update(&self, media: &mut Media) -> Result<(), RepositoryError> {
        if media.has_identity() {
            self.persist_updated(media).await
        } else {
            self.persist_new(media).await
        }
    }

    /// Insert a new item
    ///
    /// Computes level, sort order, trashed flag and path under the item's
    /// parent, resolves a unique sibling name when enabled, and writes the node,
    /// content, version and property rows. On success `media` carries its new
    /// id and tree fields and has no recorded changes.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the item already has an id
    /// - `MediaNotFound` if the parent does not exist
    /// - `StructuralIntegrity` if the computed path is malformed
    pub async fn persist_new(&self, media: &mut Media) -> Result<(), RepositoryError> {
        if media.has_identity() {
            return Err(RepositoryError::invalid_operation(format!(
                "Media {} is already persisted",
                media.id()
            )));
        }
        if media.name().trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let mut staged = media.clone();
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        let result = self.insert_rows(&tx, &mut staged).await;
        finish(tx, result).await?;

        staged.reset_dirty_properties();
        self.after_save(&staged).await;
        *media = staged;
        Ok(())
    }

    async fn insert_rows(&self, conn: &Connection, media: &mut Media) -> Result<(), RepositoryError> {
        let placement = tree::place(conn, media.parent_id(), &self.metrics).await?;

        if self.config.ensure_unique_naming {
            let name = self
                .unique_name_in(conn, media.parent_id(), media.name(), None)
                .await?;
            media.set_name(name);
        }

        let now = Utc::now();
        media.set_update_date(now);
        media.set_level(placement.level);
        media.set_sort_order(placement.sort_order);
        media.set_trashed(placement.trashed);

        self.metrics.record(StatementKind::Write);
        conn.execute(
            "INSERT INTO node \
             (unique_id, parent_id, level, path, sort_order, trashed, text, node_object_type, create_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                media.key().to_string(),
                media.parent_id(),
                placement.level,
                placement.parent_path(),
                placement.sort_order,
                placement.trashed as i64,
                media.name(),
                MEDIA_OBJECT_TYPE,
                format_timestamp(&media.create_date())
            ],
        )
        .await?;
        let id = conn.last_insert_rowid();
        media.set_identity(id);

        let path = placement.path_for(id);
        validate_path(&path, id, media.parent_id(), Some(placement.level))?;
        self.metrics.record(StatementKind::Write);
        conn.execute(
            "UPDATE node SET path = ? WHERE id = ?",
            params![path.as_str(), id],
        )
        .await?;
        media.set_path(path);

        self.metrics.record(StatementKind::Write);
        conn.execute(
            "INSERT INTO content (node_id, content_type_id) VALUES (?, ?)",
            params![id, media.content_type_id()],
        )
        .await?;

        versions::insert_version(conn, media, &self.metrics).await?;
        versions::insert_property_rows(conn, media, &self.metrics).await?;

        Ok(())
    }

    /// Update an existing item
    ///
    /// Tree fields are recomputed only when the parent changed; the item's
    /// descendants follow it. Otherwise they are taken from the stored row.
    /// When the item's version id has no row yet (after [`Media::new_version`])
    /// a new version is written and the previous one is kept as history;
    /// otherwise the current version is updated in place.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the item has no id, or would move below itself
    /// - `MediaNotFound` if the item or its new parent does not exist
    /// - `StructuralIntegrity` if a computed path is malformed
    pub async fn persist_updated(&self, media: &mut Media) -> Result<(), RepositoryError> {
        if !media.has_identity() {
            return Err(RepositoryError::invalid_operation(
                "Cannot update media that has not been persisted",
            ));
        }
        if media.name().trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let moved = media.is_property_dirty(MediaField::ParentId);
        let mut staged = media.clone();
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        let result = self.update_rows(&tx, &mut staged).await;
        finish(tx, result).await?;

        if moved {
            self.cache.clear().await;
        }
        staged.reset_dirty_properties();
        self.after_save(&staged).await;
        *media = staged;
        Ok(())
    }

    async fn update_rows(&self, conn: &Connection, media: &mut Media) -> Result<(), RepositoryError> {
        let id = media.id();
        let stored = self
            .stored_position(conn, id)
            .await?
            .ok_or_else(|| RepositoryError::media_not_found(id))?;

        if media.is_property_dirty(MediaField::ParentId) {
            self.move_rows(conn, media, &stored).await?;
        } else {
            keep_stored_position(media, stored)?;
        }

        if self.config.ensure_unique_naming {
            let name = self
                .unique_name_in(conn, media.parent_id(), media.name(), Some(id))
                .await?;
            media.set_name(name);
        }
        media.set_update_date(Utc::now());

        self.metrics.record(StatementKind::Write);
        let updated = conn
            .execute(
                "UPDATE node SET parent_id = ?, level = ?, path = ?, sort_order = ?, trashed = ?, text = ? \
                 WHERE id = ? AND node_object_type = ?",
                params![
                    media.parent_id(),
                    media.level(),
                    media.path(),
                    media.sort_order(),
                    media.trashed() as i64,
                    media.name(),
                    id,
                    MEDIA_OBJECT_TYPE
                ],
            )
            .await?;
        if updated == 0 {
            return Err(RepositoryError::media_not_found(id));
        }

        self.metrics.record(StatementKind::Write);
        conn.execute(
            "UPDATE content SET content_type_id = ? WHERE node_id = ?",
            params![media.content_type_id(), id],
        )
        .await?;

        if versions::update_version(conn, media, &self.metrics).await? {
            versions::upsert_property_rows(conn, media, &self.metrics).await?;
        } else {
            versions::insert_version(conn, media, &self.metrics).await?;
            versions::insert_property_rows(conn, media, &self.metrics).await?;
        }

        Ok(())
    }

    /// Recompute tree fields for a new parent and carry the subtree along
    async fn move_rows(
        &self,
        conn: &Connection,
        media: &mut Media,
        stored: &StoredPosition,
    ) -> Result<(), RepositoryError> {
        let id = media.id();
        let placement = tree::place(conn, media.parent_id(), &self.metrics).await?;

        if let Some(parent) = &placement.parent {
            let below_self = parent
                .path
                .split(',')
                .any(|segment| segment.parse::<i64>().ok() == Some(id));
            if below_self {
                return Err(RepositoryError::invalid_operation(format!(
                    "Cannot move media {} below itself",
                    id
                )));
            }
        }

        let path = placement.path_for(id);
        validate_path(&path, id, media.parent_id(), Some(placement.level))?;

        let descendants = tree::rewrite_descendants(
            conn,
            &stored.path,
            &path,
            placement.level - stored.level,
            placement.trashed,
            &self.metrics,
        )
        .await?;
        debug!(
            "Moved media {} from '{}' to '{}' with {} descendants",
            id, stored.path, path, descendants
        );

        media.set_path(path);
        media.set_level(placement.level);
        media.set_sort_order(placement.sort_order);
        media.set_trashed(placement.trashed);
        Ok(())
    }

    async fn stored_position(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<Option<StoredPosition>, RepositoryError> {
        self.metrics.record(StatementKind::Lookup);
        let mut rows = conn
            .query(
                "SELECT parent_id, path, level, sort_order, trashed FROM node \
                 WHERE id = ? AND node_object_type = ?",
                params![id, MEDIA_OBJECT_TYPE],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(StoredPosition {
                parent_id: row.get(0)?,
                path: row.get(1)?,
                level: row.get(2)?,
                sort_order: row.get(3)?,
                trashed: row.get::<i64>(4)? != 0,
            })),
            None => Ok(None),
        }
    }

    /// Re-cache the saved item and mirror its tags
    async fn after_save(&self, media: &Media) {
        self.cache.insert(media).await;

        let content_type = media.content_type();
        if content_type.has_tag_properties() {
            if let Err(e) = self.tags.synchronize(media, content_type).await {
                warn!("Failed to synchronize tags for media {}: {}", media.id(), e);
            }
        }
    }

    /// Delete an item, its whole subtree and every row that belongs to them
    ///
    /// Returns `false` if no media item has this id.
    pub async fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        let result = self.delete_rows(&tx, id).await;
        let deleted = finish(tx, result).await?;

        for removed in &deleted {
            self.cache.remove(*removed).await;
        }
        Ok(!deleted.is_empty())
    }

    async fn delete_rows(&self, conn: &Connection, id: i64) -> Result<Vec<i64>, RepositoryError> {
        let Some(stored) = self.stored_position(conn, id).await? else {
            return Ok(Vec::new());
        };

        self.metrics.record(StatementKind::Lookup);
        let mut rows = conn
            .query(
                "SELECT id FROM node WHERE node_object_type = ? AND (id = ? OR path LIKE ? ESCAPE '\\')",
                params![
                    MEDIA_OBJECT_TYPE,
                    id,
                    format!("{},%", like_escape(&stored.path))
                ],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }

        let id_list = json_list(&ids)?;
        for statement in [
            "DELETE FROM property_data WHERE node_id IN (SELECT value FROM json_each(?))",
            "DELETE FROM preview_xml WHERE node_id IN (SELECT value FROM json_each(?))",
            "DELETE FROM content_xml WHERE node_id IN (SELECT value FROM json_each(?))",
            "DELETE FROM content_version WHERE node_id IN (SELECT value FROM json_each(?))",
            "DELETE FROM content WHERE node_id IN (SELECT value FROM json_each(?))",
            "DELETE FROM node WHERE id IN (SELECT value FROM json_each(?))",
        ] {
            self.metrics.record(StatementKind::Write);
            conn.execute(statement, Params::Positional(vec![id_list.clone()]))
                .await?;
        }

        Ok(ids)
    }

    /// Delete one version of an item
    ///
    /// Removes the version row, its property rows and its preview snapshot,
    /// each scoped by both ids. Returns `false` if the item has no such version.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if it is the item's only version.
    pub async fn delete_version(&self, id: i64, version_id: Uuid) -> Result<bool, RepositoryError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        let result = versions::delete_version(&tx, id, version_id, &self.metrics).await;
        let deleted = finish(tx, result).await?;

        if deleted {
            self.cache.remove(id).await;
        }
        Ok(deleted)
    }

    // ----------------------------------------------------------------------
    // Names
    // ----------------------------------------------------------------------

    /// Name `desired` would be saved under below `parent_id`
    ///
    /// Returns `desired` unchanged when unique naming is disabled.
    pub async fn ensure_unique_name(
        &self,
        parent_id: Option<i64>,
        desired: &str,
        self_id: Option<i64>,
    ) -> Result<String, RepositoryError> {
        if !self.config.ensure_unique_naming {
            return Ok(desired.to_string());
        }
        let conn = self.connect().await?;
        self.unique_name_in(&conn, parent_id, desired, self_id).await
    }

    async fn unique_name_in(
        &self,
        conn: &Connection,
        parent_id: Option<i64>,
        desired: &str,
        self_id: Option<i64>,
    ) -> Result<String, RepositoryError> {
        let siblings = fetch_similar_siblings(conn, parent_id, desired, &self.metrics).await?;
        Ok(resolve_unique_name(desired, &siblings, self_id))
    }

    // ----------------------------------------------------------------------
    // Snapshots
    // ----------------------------------------------------------------------

    /// Write the live snapshot of one saved item
    pub async fn add_or_update_content_xml<F>(
        &self,
        media: &Media,
        serializer: F,
    ) -> Result<(), RepositoryError>
    where
        F: Fn(&Media) -> anyhow::Result<String>,
    {
        let xml = serializer(media).map_err(RepositoryError::Collaborator)?;
        let conn = self.connect().await?;
        upsert_content_xml(&conn, media.id(), &xml, &self.metrics).await
    }

    /// Write the snapshot of the item's current version
    pub async fn add_or_update_preview_xml<F>(
        &self,
        media: &Media,
        serializer: F,
    ) -> Result<(), RepositoryError>
    where
        F: Fn(&Media) -> anyhow::Result<String>,
    {
        let xml = serializer(media).map_err(RepositoryError::Collaborator)?;
        let conn = self.connect().await?;
        upsert_preview_xml(
            &conn,
            media.id(),
            media.version_id(),
            media.update_date(),
            &xml,
            &self.metrics,
        )
        .await
    }

    /// Regenerate the live snapshots of all non-trashed items
    ///
    /// Items are walked in groups of `group_size` (the configured default when
    /// `None`), optionally restricted to some content types. Items that fail to
    /// load, serialize or write are skipped and reported, not propagated.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use mediastore_core::services::MediaRepository;
    /// # async fn run(repository: &MediaRepository) -> Result<(), Box<dyn std::error::Error>> {
    /// let report = repository
    ///     .rebuild_content_xml(Some(500), None, |media| {
    ///         Ok(format!("<media id=\"{}\" name=\"{}\"/>", media.id(), media.name()))
    ///     })
    ///     .await?;
    /// println!("rebuilt {} snapshots", report.upserted_count());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn rebuild_content_xml<F>(
        &self,
        group_size: Option<usize>,
        content_type_ids: Option<&[i64]>,
        serializer: F,
    ) -> Result<RebuildReport, RepositoryError>
    where
        F: Fn(&Media) -> anyhow::Result<String>,
    {
        let group_size = group_size.unwrap_or(self.config.rebuild_group_size);
        if group_size == 0 {
            return Err(RepositoryError::invalid_operation(
                "Rebuild group size must be greater than 0",
            ));
        }

        let conn = self.connect().await?;
        SnapshotRebuilder::new(&conn, &*self.content_types, &self.metrics, group_size)
            .run(content_type_ids, serializer)
            .await
    }
}

/// Take the tree fields of an unmoved item from its stored row
///
/// The in-memory copy may predate a move of one of its ancestors, which
/// rewrote the stored path, level and trashed flag of the whole subtree.
fn keep_stored_position(media: &mut Media, stored: StoredPosition) -> Result<(), RepositoryError> {
    validate_path(&stored.path, media.id(), stored.parent_id, Some(stored.level))?;

    if media.parent_id() != stored.parent_id {
        media.set_parent_id(stored.parent_id);
    }
    media.set_path(stored.path);
    media.set_level(stored.level);
    media.set_sort_order(stored.sort_order);
    media.set_trashed(stored.trashed);
    Ok(())
}

/// Commit on success, roll back on failure
async fn finish<T>(
    tx: Transaction,
    result: Result<T, RepositoryError>,
) -> Result<T, RepositoryError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Failed to roll back transaction: {}", rollback_err);
            }
            Err(e)
        }
    }
}
