//! Integration tests for MediaRepository retrieval and persistence
//!
//! Tests cover:
//! - Lookup by id, id list, query, version and page
//! - Batched property loading (statement counts)
//! - Version history and single-version deletion
//! - Cache read-through behaviour
//! - Tag synchronization hook

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mediastore_core::{
    db::{DatabaseService, StatementKind},
    models::{
        ContentType, Direction, Media, MediaQuery, PagedQuery, PropertyType, PropertyValue,
        SortField, ValueStorage,
    },
    services::{
        ContentTypeRegistry, InMemoryMediaCache, MediaCache, MediaRepository, RepositoryError,
        TagSynchronizer,
    },
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const FOLDER_TYPE_ID: i64 = 1031;
const IMAGE_TYPE_ID: i64 = 1032;

fn folder_type() -> ContentType {
    ContentType::new(FOLDER_TYPE_ID, "folder", "Folder")
}

fn image_type() -> ContentType {
    ContentType::new(IMAGE_TYPE_ID, "image", "Image")
        .with_property_type(PropertyType::new(6, "umbracoFile", ValueStorage::Nvarchar))
        .with_property_type(PropertyType::new(7, "umbracoWidth", ValueStorage::Integer))
        .with_property_type(PropertyType::new(8, "focalPoint", ValueStorage::Decimal))
        .with_property_type(PropertyType::new(9, "takenOn", ValueStorage::Date))
        .with_property_type(PropertyType::new(10, "tags", ValueStorage::Ntext).tags())
}

/// Records every synchronized media id
#[derive(Default)]
struct RecordingTags {
    synchronized: Mutex<Vec<i64>>,
    fail: bool,
}

#[async_trait]
impl TagSynchronizer for RecordingTags {
    async fn synchronize(&self, media: &Media, _content_type: &ContentType) -> anyhow::Result<()> {
        self.synchronized.lock().unwrap().push(media.id());
        if self.fail {
            anyhow::bail!("tag index unavailable");
        }
        Ok(())
    }
}

struct TestEnv {
    db: DatabaseService,
    repository: MediaRepository,
    cache: Arc<InMemoryMediaCache>,
    tags: Arc<RecordingTags>,
    folder: Arc<ContentType>,
    image: Arc<ContentType>,
    _temp_dir: TempDir,
}

/// Test helper: Create a test environment
async fn create_test_env() -> Result<TestEnv> {
    create_test_env_with_tags(RecordingTags::default()).await
}

async fn create_test_env_with_tags(tags: RecordingTags) -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let db = DatabaseService::new(temp_dir.path().join("media.db")).await?;

    let registry = Arc::new(ContentTypeRegistry::with_types([folder_type(), image_type()]));
    let cache = Arc::new(InMemoryMediaCache::new());
    let tags = Arc::new(tags);
    let repository = MediaRepository::builder(&db)
        .content_types(registry)
        .cache(cache.clone())
        .tags(tags.clone())
        .build()?;

    Ok(TestEnv {
        db,
        repository,
        cache,
        tags,
        folder: Arc::new(folder_type()),
        image: Arc::new(image_type()),
        _temp_dir: temp_dir,
    })
}

async fn save_image(env: &TestEnv, name: &str, parent_id: Option<i64>, width: i64) -> Result<Media> {
    let mut media = Media::new(name, parent_id, Arc::clone(&env.image));
    media.set_property_value("umbracoFile", format!("/media/{}.jpg", name))?;
    media.set_property_value("umbracoWidth", width)?;
    env.repository.add_or_update(&mut media).await?;
    Ok(media)
}

async fn count_table(env: &TestEnv, sql: &str) -> Result<i64> {
    let conn = env.db.connect_with_timeout().await?;
    let mut rows = conn.query(sql, ()).await?;
    let row = rows.next().await?.expect("count row");
    Ok(row.get::<i64>(0)?)
}

// =========================================================================
// Lookup Tests
// =========================================================================

#[tokio::test]
async fn test_get_missing_returns_none() -> Result<()> {
    let env = create_test_env().await?;

    assert!(env.repository.get(987_654).await?.is_none());
    // the recycle bin row is not a media item
    assert!(env.repository.get(env.repository.recycle_bin_id()).await?.is_none());
    assert!(!env.repository.exists(987_654).await?);
    Ok(())
}

#[tokio::test]
async fn test_properties_round_trip() -> Result<()> {
    let env = create_test_env().await?;
    let taken_on = Utc.with_ymd_and_hms(2023, 7, 14, 9, 30, 0).unwrap();

    let mut media = Media::new("Beach", None, Arc::clone(&env.image));
    media.set_property_value("umbracoFile", "/media/beach.jpg")?;
    media.set_property_value("umbracoWidth", 1920)?;
    media.set_property_value("focalPoint", 0.25)?;
    media.set_property_value("takenOn", taken_on)?;
    env.repository.add_or_update(&mut media).await?;
    env.cache.clear().await;

    let loaded = env.repository.get(media.id()).await?.expect("saved media");
    assert_eq!(loaded.name(), "Beach");
    assert_eq!(loaded.content_type_id(), IMAGE_TYPE_ID);
    assert_eq!(loaded.key(), media.key());
    assert_eq!(
        loaded.properties().value("umbracoFile"),
        Some(&PropertyValue::Text("/media/beach.jpg".to_string()))
    );
    assert_eq!(loaded.properties().value("umbracoWidth"), Some(&PropertyValue::Integer(1920)));
    assert_eq!(loaded.properties().value("focalPoint"), Some(&PropertyValue::Decimal(0.25)));
    assert_eq!(loaded.properties().value("takenOn"), Some(&PropertyValue::Date(taken_on)));
    assert_eq!(loaded.properties().value("tags"), None);
    assert_eq!(loaded.properties().len(), 5);
    assert!(!loaded.is_dirty(), "Loaded media should carry no changes");
    Ok(())
}

#[tokio::test]
async fn test_get_all_issues_one_property_statement() -> Result<()> {
    let env = create_test_env().await?;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(save_image(&env, &format!("Image {}", i), None, 100 + i).await?.id());
    }
    let mut folder = Media::new("Folder", None, Arc::clone(&env.folder));
    env.repository.add_or_update(&mut folder).await?;
    ids.push(folder.id());
    env.cache.clear().await;

    let before = env.repository.metrics().snapshot();
    let items = env.repository.get_all(&ids).await?;
    let after = env.repository.metrics().snapshot();

    assert_eq!(items.len(), 6);
    assert_eq!(after.delta(&before, StatementKind::Base), 1);
    assert_eq!(after.delta(&before, StatementKind::Property), 1);
    assert_eq!(
        items.iter().map(Media::id).collect::<Vec<_>>(),
        ids,
        "Items should come back ordered by id"
    );
    for (i, item) in items.iter().take(5).enumerate() {
        assert_eq!(
            item.properties().value("umbracoWidth"),
            Some(&PropertyValue::Integer(100 + i as i64))
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_get_all_served_from_cache_skips_property_statement() -> Result<()> {
    let env = create_test_env().await?;

    let a = save_image(&env, "A", None, 1).await?;
    let b = save_image(&env, "B", None, 2).await?;

    // saves re-cache the saved items
    let before = env.repository.metrics().snapshot();
    let items = env.repository.get_all(&[a.id(), b.id()]).await?;
    let after = env.repository.metrics().snapshot();

    assert_eq!(items.len(), 2);
    assert_eq!(after.delta(&before, StatementKind::Base), 1);
    assert_eq!(after.delta(&before, StatementKind::Property), 0);
    Ok(())
}

#[tokio::test]
async fn test_get_all_with_empty_ids_returns_everything() -> Result<()> {
    let env = create_test_env().await?;

    save_image(&env, "A", None, 1).await?;
    save_image(&env, "B", None, 2).await?;

    assert_eq!(env.repository.get_all(&[]).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_get_by_query_filters() -> Result<()> {
    let env = create_test_env().await?;

    let mut folder = Media::new("Albums", None, Arc::clone(&env.folder));
    env.repository.add_or_update(&mut folder).await?;
    save_image(&env, "Inside 1", Some(folder.id()), 10).await?;
    save_image(&env, "Inside 2", Some(folder.id()), 20).await?;
    save_image(&env, "Outside", None, 30).await?;

    let children = env
        .repository
        .get_by_query(&MediaQuery::new().with_parent_id(folder.id()))
        .await?;
    assert_eq!(
        children.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
        vec!["Inside 1", "Inside 2"]
    );

    let images = env
        .repository
        .get_by_query(&MediaQuery::new().with_content_type_ids(vec![IMAGE_TYPE_ID]))
        .await?;
    assert_eq!(images.len(), 3);

    let roots = env.repository.get_by_query(&MediaQuery::new().with_is_root(true)).await?;
    assert_eq!(roots.len(), 2);

    let descendants = env
        .repository
        .get_by_query(&MediaQuery::new().with_descendants_of_path(folder.path()))
        .await?;
    assert_eq!(descendants.len(), 2);

    assert_eq!(
        env.repository
            .count(&MediaQuery::new().with_name_contains("inside"))
            .await?,
        2
    );
    Ok(())
}

// =========================================================================
// Paged Query Tests
// =========================================================================

#[tokio::test]
async fn test_paged_query() -> Result<()> {
    let env = create_test_env().await?;

    let mut folder = Media::new("Gallery", None, Arc::clone(&env.folder));
    env.repository.add_or_update(&mut folder).await?;
    for i in 1..=7 {
        save_image(&env, &format!("Item {}", i), Some(folder.id()), i).await?;
    }

    let query = MediaQuery::new().with_parent_id(folder.id());

    let page = env
        .repository
        .get_paged(&PagedQuery::new(query.clone(), 1, 3))
        .await?;
    assert_eq!(page.total, 7);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(
        page.items.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
        vec!["Item 4", "Item 5", "Item 6"]
    );

    let last = env
        .repository
        .get_paged(&PagedQuery::new(query.clone(), 2, 3))
        .await?;
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.total, 7);

    let descending = env
        .repository
        .get_paged(
            &PagedQuery::new(query.clone(), 0, 2)
                .with_order_by(SortField::Name, Direction::Descending),
        )
        .await?;
    assert_eq!(descending.items[0].name(), "Item 7");
    assert_eq!(descending.items[1].name(), "Item 6");

    let filtered = env
        .repository
        .get_paged(&PagedQuery::new(query.clone(), 0, 10).with_filter("item 3"))
        .await?;
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.items[0].name(), "Item 3");

    let empty = env
        .repository
        .get_paged(&PagedQuery::new(query, 0, 10).with_filter("nothing"))
        .await?;
    assert_eq!(empty.total, 0);
    assert!(empty.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_paged_query_rejects_zero_page_size() -> Result<()> {
    let env = create_test_env().await?;

    let result = env
        .repository
        .get_paged(&PagedQuery::new(MediaQuery::new(), 0, 0))
        .await;
    assert!(matches!(result, Err(RepositoryError::InvalidOperation(_))));
    Ok(())
}

#[tokio::test]
async fn test_paged_query_far_past_the_end_is_empty() -> Result<()> {
    let env = create_test_env().await?;
    save_image(&env, "Only", None, 100).await?;

    let page = env
        .repository
        .get_paged(&PagedQuery::new(MediaQuery::new(), usize::MAX / 2, 4))
        .await?;
    assert!(page.items.is_empty());
    assert_eq!(page.total, 1);

    let page = env
        .repository
        .get_paged(&PagedQuery::new(MediaQuery::new(), 0, usize::MAX))
        .await?;
    assert_eq!(page.items.len(), 1);
    Ok(())
}

// =========================================================================
// Version Tests
// =========================================================================

#[tokio::test]
async fn test_versions_keep_their_own_properties() -> Result<()> {
    let env = create_test_env().await?;

    let mut media = save_image(&env, "Sunset", None, 100).await?;
    let first_version = media.version_id();

    media.new_version();
    media.set_property_value("umbracoWidth", 200)?;
    env.repository.add_or_update(&mut media).await?;
    let second_version = media.version_id();
    assert_ne!(first_version, second_version);

    env.cache.clear().await;
    let current = env.repository.get(media.id()).await?.expect("current version");
    assert_eq!(current.version_id(), second_version);
    assert_eq!(current.properties().value("umbracoWidth"), Some(&PropertyValue::Integer(200)));

    let old = env
        .repository
        .get_by_version(first_version)
        .await?
        .expect("historical version");
    assert_eq!(old.id(), media.id());
    assert_eq!(old.properties().value("umbracoWidth"), Some(&PropertyValue::Integer(100)));

    let all = env.repository.get_all_versions(media.id()).await?;
    assert_eq!(
        all.iter().map(Media::version_id).collect::<Vec<_>>(),
        vec![second_version, first_version],
        "Versions should be newest first"
    );
    assert_eq!(all[1].properties().value("umbracoWidth"), Some(&PropertyValue::Integer(100)));

    assert!(env.repository.get_by_version(uuid::Uuid::new_v4()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_update_in_place_keeps_single_version() -> Result<()> {
    let env = create_test_env().await?;

    let mut media = save_image(&env, "Portrait", None, 300).await?;
    media.set_property_value("umbracoWidth", 310)?;
    media.set_name("Portrait (cropped)");
    env.repository.add_or_update(&mut media).await?;

    let all = env.repository.get_all_versions(media.id()).await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name(), "Portrait (cropped)");
    assert_eq!(all[0].properties().value("umbracoWidth"), Some(&PropertyValue::Integer(310)));
    Ok(())
}

#[tokio::test]
async fn test_delete_version_is_scoped_to_item_and_version() -> Result<()> {
    let env = create_test_env().await?;

    let mut a = save_image(&env, "A", None, 1).await?;
    let a_first = a.version_id();
    a.new_version();
    env.repository.add_or_update(&mut a).await?;

    let mut b = save_image(&env, "B", None, 2).await?;
    let b_first = b.version_id();
    b.new_version();
    env.repository.add_or_update(&mut b).await?;

    env.repository
        .add_or_update_preview_xml(&a, |m| Ok(format!("<a v=\"{}\"/>", m.version_id())))
        .await?;

    // a version id of B is not a version of A
    assert!(!env.repository.delete_version(a.id(), b_first).await?);

    assert!(env.repository.delete_version(a.id(), a_first).await?);
    assert_eq!(env.repository.get_all_versions(a.id()).await?.len(), 1);
    assert_eq!(env.repository.get_all_versions(b.id()).await?.len(), 2);
    assert!(env.repository.get_by_version(a_first).await?.is_none());

    // the remaining version and its preview are intact
    assert_eq!(
        count_table(&env, "SELECT COUNT(*) FROM preview_xml").await?,
        1
    );
    env.cache.clear().await;
    let current = env.repository.get(a.id()).await?.expect("A survives");
    assert_eq!(current.properties().value("umbracoWidth"), Some(&PropertyValue::Integer(1)));

    let last = env.repository.delete_version(a.id(), a.version_id()).await;
    assert!(matches!(last, Err(RepositoryError::InvalidOperation(_))));
    Ok(())
}

// =========================================================================
// Cache Tests
// =========================================================================

#[tokio::test]
async fn test_get_reads_through_cache() -> Result<()> {
    let env = create_test_env().await?;

    let media = save_image(&env, "Cached", None, 1).await?;
    env.cache.clear().await;

    let before = env.repository.metrics().snapshot();
    env.repository.get(media.id()).await?.expect("first load");
    env.repository.get(media.id()).await?.expect("second load");
    let after = env.repository.metrics().snapshot();

    assert_eq!(after.delta(&before, StatementKind::Base), 1);
    let stats = env.cache.stats().await;
    assert_eq!(stats.entries, 1);
    assert!(stats.hits >= 1);
    Ok(())
}

#[tokio::test]
async fn test_queries_bypass_cache() -> Result<()> {
    let env = create_test_env().await?;

    save_image(&env, "A", None, 1).await?;
    env.cache.clear().await;

    env.repository.get_by_query(&MediaQuery::new()).await?;
    env.repository
        .get_paged(&PagedQuery::new(MediaQuery::new(), 0, 10))
        .await?;
    assert_eq!(env.cache.stats().await.entries, 0);
    Ok(())
}

// =========================================================================
// Delete Tests
// =========================================================================

#[tokio::test]
async fn test_delete_removes_subtree() -> Result<()> {
    let env = create_test_env().await?;

    let mut folder = Media::new("Trip", None, Arc::clone(&env.folder));
    env.repository.add_or_update(&mut folder).await?;
    let child = save_image(&env, "Photo", Some(folder.id()), 1).await?;
    let other = save_image(&env, "Other", None, 2).await?;
    env.repository
        .add_or_update_content_xml(&child, |m| Ok(format!("<image id=\"{}\"/>", m.id())))
        .await?;

    assert!(env.repository.delete(folder.id()).await?);
    assert!(!env.repository.delete(folder.id()).await?);

    assert!(env.repository.get(child.id()).await?.is_none());
    assert!(env.repository.get(other.id()).await?.is_some());
    assert_eq!(count_table(&env, "SELECT COUNT(*) FROM content_xml").await?, 0);
    assert_eq!(
        count_table(&env, "SELECT COUNT(*) FROM property_data").await?,
        5,
        "Only the remaining image's property rows should be left"
    );
    Ok(())
}

// =========================================================================
// Tag Synchronization Tests
// =========================================================================

#[tokio::test]
async fn test_tags_synchronized_after_save() -> Result<()> {
    let env = create_test_env().await?;

    let mut image = save_image(&env, "Tagged", None, 1).await?;
    image.set_property_value("tags", "beach,summer")?;
    env.repository.add_or_update(&mut image).await?;

    // folders declare no tag properties
    let mut folder = Media::new("Plain", None, Arc::clone(&env.folder));
    env.repository.add_or_update(&mut folder).await?;

    let synchronized = env.tags.synchronized.lock().unwrap().clone();
    assert_eq!(synchronized, vec![image.id(), image.id()]);
    Ok(())
}

#[tokio::test]
async fn test_tag_failure_does_not_fail_save() -> Result<()> {
    let env = create_test_env_with_tags(RecordingTags {
        fail: true,
        ..Default::default()
    })
    .await?;

    let media = save_image(&env, "Still saved", None, 1).await?;
    assert!(media.has_identity());
    assert!(env.repository.exists(media.id()).await?);
    Ok(())
}
