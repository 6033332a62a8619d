//! Integration tests for snapshot rebuilding
//!
//! Tests cover:
//! - Group-wise walking in ascending id order
//! - Per-item failures reported without aborting the walk
//! - Content type and trashed filtering
//! - Snapshot upserts

use anyhow::{bail, Result};
use mediastore_core::{
    db::DatabaseService,
    models::{ContentType, Media, PropertyType, ValueStorage},
    services::{ContentTypeRegistry, MediaRepository, RebuildOutcome},
};
use std::sync::Arc;
use tempfile::TempDir;

struct TestEnv {
    db: DatabaseService,
    repository: MediaRepository,
    folder: Arc<ContentType>,
    image: Arc<ContentType>,
    _temp_dir: TempDir,
}

/// Route rebuild logs to the test output, filtered by `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Test helper: Create a test environment
async fn create_test_env() -> Result<TestEnv> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let db = DatabaseService::new(temp_dir.path().join("media.db")).await?;

    let folder = ContentType::new(1031, "folder", "Folder");
    let image = ContentType::new(1032, "image", "Image").with_property_type(PropertyType::new(
        6,
        "umbracoFile",
        ValueStorage::Nvarchar,
    ));
    let registry = Arc::new(ContentTypeRegistry::with_types([
        folder.clone(),
        image.clone(),
    ]));
    let repository = MediaRepository::builder(&db).content_types(registry).build()?;

    Ok(TestEnv {
        db,
        repository,
        folder: Arc::new(folder),
        image: Arc::new(image),
        _temp_dir: temp_dir,
    })
}

async fn create(env: &TestEnv, content_type: &Arc<ContentType>, name: &str) -> Result<Media> {
    let mut media = Media::new(name, None, Arc::clone(content_type));
    env.repository.add_or_update(&mut media).await?;
    Ok(media)
}

fn serialize(media: &Media) -> Result<String> {
    Ok(format!("<media id=\"{}\" name=\"{}\"/>", media.id(), media.name()))
}

async fn snapshot_of(env: &TestEnv, id: i64) -> Result<Option<String>> {
    let conn = env.db.connect_with_timeout().await?;
    let mut rows = conn
        .query("SELECT xml FROM content_xml WHERE node_id = ?", [id])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

async fn snapshot_count(env: &TestEnv) -> Result<i64> {
    let conn = env.db.connect_with_timeout().await?;
    let mut rows = conn.query("SELECT COUNT(*) FROM content_xml", ()).await?;
    let row = rows.next().await?.expect("count row");
    Ok(row.get(0)?)
}

// =========================================================================
// Group Walking Tests
// =========================================================================

#[tokio::test]
async fn test_rebuild_walks_groups_in_id_order() -> Result<()> {
    let env = create_test_env().await?;
    let mut ids = Vec::new();
    for i in 1..=5 {
        ids.push(create(&env, &env.image, &format!("Image {}", i)).await?.id());
    }

    let report = env
        .repository
        .rebuild_content_xml(Some(2), None, serialize)
        .await?;

    assert_eq!(report.group_sizes, vec![2, 2, 1]);
    let visited: Vec<i64> = report.outcomes.iter().map(RebuildOutcome::id).collect();
    assert_eq!(visited, ids, "Every item visited once, ascending");
    assert_eq!(report.upserted_count(), 5);
    assert_eq!(snapshot_count(&env).await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_skips_failing_item() -> Result<()> {
    let env = create_test_env().await?;
    let mut ids = Vec::new();
    for i in 1..=5 {
        ids.push(create(&env, &env.image, &format!("Image {}", i)).await?.id());
    }
    let failing = ids[2];

    let report = env
        .repository
        .rebuild_content_xml(Some(2), None, |media| {
            if media.id() == failing {
                bail!("cannot serialize media {}", media.id());
            }
            serialize(media)
        })
        .await?;

    let skipped: Vec<&RebuildOutcome> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].id(), failing);
    match skipped[0] {
        RebuildOutcome::Skipped { cause, .. } => assert!(cause.contains("cannot serialize")),
        other => panic!("Expected a skipped outcome, got {:?}", other),
    }

    // the walk continued past the failure
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.upserted_count(), 4);
    assert_eq!(snapshot_count(&env).await?, 4);
    assert!(snapshot_of(&env, failing).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_rebuild_skips_item_whose_snapshot_write_fails() -> Result<()> {
    let env = create_test_env().await?;
    let mut ids = Vec::new();
    for i in 1..=4 {
        ids.push(create(&env, &env.image, &format!("Image {}", i)).await?.id());
    }
    let rejected = ids[1];

    // the snapshot write for one item fails inside the database
    let conn = env.db.connect_with_timeout().await?;
    conn.execute(
        &format!(
            "CREATE TRIGGER reject_snapshot BEFORE INSERT ON content_xml \
             WHEN NEW.node_id = {} BEGIN SELECT RAISE(ABORT, 'snapshot rejected'); END",
            rejected
        ),
        (),
    )
    .await?;

    let report = env
        .repository
        .rebuild_content_xml(Some(3), None, serialize)
        .await?;

    let skipped: Vec<&RebuildOutcome> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    match skipped[0] {
        RebuildOutcome::Skipped { id, cause } => {
            assert_eq!(*id, rejected);
            assert!(cause.contains("snapshot rejected"));
        }
        other => panic!("Expected a skipped outcome, got {:?}", other),
    }

    assert_eq!(report.group_sizes, vec![3, 1]);
    assert_eq!(report.upserted_count(), 3);
    assert!(snapshot_of(&env, rejected).await?.is_none());
    assert_eq!(snapshot_count(&env).await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_with_default_group_size() -> Result<()> {
    let env = create_test_env().await?;
    for i in 1..=3 {
        create(&env, &env.image, &format!("Image {}", i)).await?;
    }

    let report = env.repository.rebuild_content_xml(None, None, serialize).await?;
    assert_eq!(report.group_sizes, vec![3]);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_of_empty_store() -> Result<()> {
    let env = create_test_env().await?;

    let report = env.repository.rebuild_content_xml(Some(10), None, serialize).await?;
    assert!(report.group_sizes.is_empty());
    assert!(report.outcomes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rebuild_rejects_zero_group_size() -> Result<()> {
    let env = create_test_env().await?;
    create(&env, &env.image, "Image").await?;

    let result = env.repository.rebuild_content_xml(Some(0), None, serialize).await;
    assert!(result.is_err());
    assert_eq!(snapshot_count(&env).await?, 0);
    Ok(())
}

// =========================================================================
// Filtering Tests
// =========================================================================

#[tokio::test]
async fn test_rebuild_filters_by_content_type() -> Result<()> {
    let env = create_test_env().await?;
    let folder = create(&env, &env.folder, "Folder").await?;
    let image = create(&env, &env.image, "Image").await?;

    let report = env
        .repository
        .rebuild_content_xml(Some(10), Some(&[env.image.id][..]), serialize)
        .await?;

    assert_eq!(
        report.outcomes,
        vec![RebuildOutcome::Upserted { id: image.id() }]
    );
    assert!(snapshot_of(&env, folder.id()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_rebuild_excludes_trashed_items() -> Result<()> {
    let env = create_test_env().await?;
    let kept = create(&env, &env.image, "Kept").await?;
    let mut binned = create(&env, &env.image, "Binned").await?;

    binned.set_parent_id(Some(env.repository.recycle_bin_id()));
    env.repository.add_or_update(&mut binned).await?;

    let report = env.repository.rebuild_content_xml(Some(10), None, serialize).await?;
    let visited: Vec<i64> = report.outcomes.iter().map(RebuildOutcome::id).collect();
    assert_eq!(visited, vec![kept.id()]);
    Ok(())
}

// =========================================================================
// Upsert Tests
// =========================================================================

#[tokio::test]
async fn test_rebuild_overwrites_existing_snapshot() -> Result<()> {
    let env = create_test_env().await?;
    let mut image = create(&env, &env.image, "Before").await?;
    env.repository
        .add_or_update_content_xml(&image, serialize)
        .await?;

    image.set_name("After");
    env.repository.add_or_update(&mut image).await?;
    env.repository.rebuild_content_xml(Some(10), None, serialize).await?;

    let xml = snapshot_of(&env, image.id()).await?.expect("snapshot stored");
    assert!(xml.contains("name=\"After\""));
    assert_eq!(snapshot_count(&env).await?, 1);
    Ok(())
}
