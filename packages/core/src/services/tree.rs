//! Tree placement
//!
//! Computes where a media item sits in the tree: its level, its sort order
//! among siblings, its path and its trashed flag. Paths are comma-joined
//! ancestor ids ending in the item's own id (`"1050,1061,1070"`); root items
//! have a path of just their id.
//!
//! # Sibling sort order
//!
//! Siblings are the rows with the same parent and the same object type. Both
//! inserts and moves append: `MAX(sort_order) + 1`, or `0` when the parent has
//! no media children yet.

use crate::db::{QueryMetrics, StatementKind};
use crate::models::{MEDIA_OBJECT_TYPE, MEDIA_RECYCLE_BIN_ID, RECYCLE_BIN_OBJECT_TYPE};
use crate::services::select::like_escape;
use crate::services::RepositoryError;
use libsql::{params, Connection};

/// What a child needs to know about its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParentInfo {
    pub id: i64,
    pub level: i64,
    pub path: String,
    pub trashed: bool,
}

impl ParentInfo {
    /// Children of the recycle bin, and of anything already trashed, are trashed
    pub fn trashes_children(&self) -> bool {
        self.id == MEDIA_RECYCLE_BIN_ID || self.trashed
    }
}

/// Computed tree position of an item under a parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub parent: Option<ParentInfo>,
    pub level: i64,
    pub sort_order: i64,
    pub trashed: bool,
}

impl Placement {
    /// Path of the parent, or empty for a root item
    pub fn parent_path(&self) -> &str {
        self.parent.as_ref().map(|p| p.path.as_str()).unwrap_or("")
    }

    /// Full path of the item with the given id at this placement
    pub fn path_for(&self, id: i64) -> String {
        child_path(self.parent.as_ref().map(|p| p.path.as_str()), id)
    }
}

/// Append an id to a parent path
pub fn child_path(parent_path: Option<&str>, id: i64) -> String {
    match parent_path {
        Some(path) if !path.is_empty() => format!("{},{}", path, id),
        _ => id.to_string(),
    }
}

/// Check a path against the item it belongs to
///
/// The path must be non-empty, consist of integer segments without repeats,
/// end with `id` and, below a parent, have `parent_id` as its second-to-last
/// segment. A root path has exactly one segment. When `level` is given the
/// path must have that many segments, plus one for the bin's own segment when
/// the item sits below the recycle bin.
pub fn validate_path(
    path: &str,
    id: i64,
    parent_id: Option<i64>,
    level: Option<i64>,
) -> Result<(), RepositoryError> {
    if path.is_empty() {
        return Err(RepositoryError::structural(format!("Media {} has an empty path", id)));
    }

    let mut segments = Vec::new();
    for segment in path.split(',') {
        let value: i64 = segment.parse().map_err(|_| {
            RepositoryError::structural(format!(
                "Media {} path '{}' has a non-integer segment '{}'",
                id, path, segment
            ))
        })?;
        if segments.contains(&value) {
            return Err(RepositoryError::structural(format!(
                "Media {} path '{}' repeats {}",
                id, path, value
            )));
        }
        segments.push(value);
    }

    if segments.last() != Some(&id) {
        return Err(RepositoryError::structural(format!(
            "Media {} path '{}' does not end with its own id",
            id, path
        )));
    }

    match parent_id {
        Some(parent_id) => {
            let parent_segment = segments.len().checked_sub(2).map(|i| segments[i]);
            if parent_segment != Some(parent_id) {
                return Err(RepositoryError::structural(format!(
                    "Media {} path '{}' does not pass through parent {}",
                    id, path, parent_id
                )));
            }
        }
        None => {
            if segments.len() != 1 {
                return Err(RepositoryError::structural(format!(
                    "Root media {} has a nested path '{}'",
                    id, path
                )));
            }
        }
    }

    if let Some(level) = level {
        let bin_segment = (segments[0] == MEDIA_RECYCLE_BIN_ID) as i64;
        if segments.len() as i64 != level + bin_segment {
            return Err(RepositoryError::structural(format!(
                "Media {} path '{}' does not match level {}",
                id, path, level
            )));
        }
    }

    Ok(())
}

/// Look up the parent a media item is placed under
///
/// The parent must be a media item or the recycle bin.
pub(crate) async fn lookup_parent(
    conn: &Connection,
    parent_id: i64,
    metrics: &QueryMetrics,
) -> Result<ParentInfo, RepositoryError> {
    metrics.record(StatementKind::Lookup);
    let mut rows = conn
        .query(
            "SELECT id, level, path, trashed, node_object_type FROM node WHERE id = ?",
            params![parent_id],
        )
        .await?;

    let row = rows
        .next()
        .await?
        .ok_or_else(|| RepositoryError::media_not_found(parent_id))?;

    let object_type: String = row.get(4)?;
    if object_type != MEDIA_OBJECT_TYPE && object_type != RECYCLE_BIN_OBJECT_TYPE {
        return Err(RepositoryError::invalid_operation(format!(
            "Node {} cannot hold media items",
            parent_id
        )));
    }

    let trashed: i64 = row.get(3)?;
    Ok(ParentInfo {
        id: row.get(0)?,
        level: row.get(1)?,
        path: row.get(2)?,
        trashed: trashed != 0,
    })
}

/// Highest sort order among the media children of `parent_id`
pub(crate) async fn max_sibling_sort_order(
    conn: &Connection,
    parent_id: Option<i64>,
    metrics: &QueryMetrics,
) -> Result<Option<i64>, RepositoryError> {
    metrics.record(StatementKind::Lookup);
    let mut rows = conn
        .query(
            "SELECT MAX(sort_order) FROM node WHERE parent_id IS ? AND node_object_type = ?",
            params![parent_id, MEDIA_OBJECT_TYPE],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<i64>>(0)?),
        None => Ok(None),
    }
}

/// Compute level, sort order and trashed flag for an item under `parent_id`
pub(crate) async fn place(
    conn: &Connection,
    parent_id: Option<i64>,
    metrics: &QueryMetrics,
) -> Result<Placement, RepositoryError> {
    let parent = match parent_id {
        Some(id) => Some(lookup_parent(conn, id, metrics).await?),
        None => None,
    };

    let sort_order = match max_sibling_sort_order(conn, parent_id, metrics).await? {
        Some(max) => max + 1,
        None => 0,
    };

    let level = parent.as_ref().map(|p| p.level + 1).unwrap_or(1);
    let trashed = parent.as_ref().map(ParentInfo::trashes_children).unwrap_or(false);

    Ok(Placement {
        parent,
        level,
        sort_order,
        trashed,
    })
}

/// Rewrite the paths, levels and trashed flags of every descendant of a moved item
///
/// Returns the number of descendants updated.
pub(crate) async fn rewrite_descendants(
    conn: &Connection,
    old_path: &str,
    new_path: &str,
    level_delta: i64,
    trashed: bool,
    metrics: &QueryMetrics,
) -> Result<u64, RepositoryError> {
    let old_prefix_len = old_path.chars().count() as i64;

    metrics.record(StatementKind::Write);
    let updated = conn
        .execute(
            "UPDATE node SET path = ? || substr(path, ?), level = level + ?, trashed = ? \
             WHERE path LIKE ? ESCAPE '\\' AND node_object_type = ?",
            params![
                new_path,
                old_prefix_len + 1,
                level_delta,
                trashed as i64,
                format!("{},%", like_escape(old_path)),
                MEDIA_OBJECT_TYPE
            ],
        )
        .await?;

    Ok(updated)
}
