//! Version rows
//!
//! Every save writes into a `content_version` row identified by the item's
//! version id. Saving after [`Media::new_version`](crate::models::Media::new_version)
//! inserts a fresh row and a fresh set of property rows; the previous ones stay
//! behind as history and remain readable through
//! [`MediaRepository::get_all_versions`](crate::services::MediaRepository::get_all_versions).
//!
//! The current version of an item is its newest row by `version_date`, ties
//! broken by insertion order.

use crate::db::rows::{format_timestamp, PropertyColumns};
use crate::db::{QueryMetrics, StatementKind};
use crate::models::{Media, Property};
use crate::services::select::{json_list, MediaSelect, SqlFilter};
use crate::services::RepositoryError;
use libsql::params::Params;
use libsql::{params, Connection, Value};
use uuid::Uuid;

/// Selection of the current version of one item
pub(crate) fn current_of(id: i64) -> MediaSelect {
    MediaSelect::current(SqlFilter::new().and("n.id = ?", [Value::Integer(id)]))
}

/// Selection of one specific version, whether current or historical
pub(crate) fn by_version(version_id: Uuid) -> MediaSelect {
    MediaSelect::all_versions(
        SqlFilter::new().and("v.version_id = ?", [Value::Text(version_id.to_string())]),
    )
}

/// Selection of every version of one item, newest first
pub(crate) fn all_of(id: i64) -> MediaSelect {
    MediaSelect::all_versions(SqlFilter::new().and("n.id = ?", [Value::Integer(id)]))
        .order_by("v.version_date DESC, v.id DESC")
}

/// Whether a version row with this id exists for the item
pub(crate) async fn version_exists(
    conn: &Connection,
    id: i64,
    version_id: Uuid,
    metrics: &QueryMetrics,
) -> Result<bool, RepositoryError> {
    metrics.record(StatementKind::Lookup);
    let mut rows = conn
        .query(
            "SELECT 1 FROM content_version WHERE node_id = ? AND version_id = ?",
            params![id, version_id.to_string()],
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

/// Number of stored versions of an item
pub(crate) async fn version_count(
    conn: &Connection,
    id: i64,
    metrics: &QueryMetrics,
) -> Result<i64, RepositoryError> {
    metrics.record(StatementKind::Count);
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM content_version WHERE node_id = ?",
            params![id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

/// Insert a version row for the item's current version id
pub(crate) async fn insert_version(
    conn: &Connection,
    media: &Media,
    metrics: &QueryMetrics,
) -> Result<(), RepositoryError> {
    metrics.record(StatementKind::Write);
    conn.execute(
        "INSERT INTO content_version (node_id, version_id, version_date, content_type_id, text) \
         VALUES (?, ?, ?, ?, ?)",
        params![
            media.id(),
            media.version_id().to_string(),
            format_timestamp(&media.update_date()),
            media.content_type_id(),
            media.name()
        ],
    )
    .await?;
    Ok(())
}

/// Refresh an existing version row in place
///
/// Returns `false` when the row does not exist.
pub(crate) async fn update_version(
    conn: &Connection,
    media: &Media,
    metrics: &QueryMetrics,
) -> Result<bool, RepositoryError> {
    metrics.record(StatementKind::Write);
    let updated = conn
        .execute(
            "UPDATE content_version SET version_date = ?, content_type_id = ?, text = ? \
             WHERE node_id = ? AND version_id = ?",
            params![
                format_timestamp(&media.update_date()),
                media.content_type_id(),
                media.name(),
                media.id(),
                media.version_id().to_string()
            ],
        )
        .await?;
    Ok(updated > 0)
}

fn property_params(media: &Media, property: &Property) -> Vec<Value> {
    let columns = PropertyColumns::encode(property.property_type().storage, property.value());
    let mut values = Vec::with_capacity(8);
    values.extend(columns.into_values());
    values.push(Value::Integer(media.id()));
    values.push(Value::Text(media.version_id().to_string()));
    values.push(Value::Integer(property.property_type().id));
    values
}

/// Insert one property row per declared property of the item's version
pub(crate) async fn insert_property_rows(
    conn: &Connection,
    media: &Media,
    metrics: &QueryMetrics,
) -> Result<(), RepositoryError> {
    for property in media.properties() {
        metrics.record(StatementKind::Write);
        conn.execute(
            "INSERT INTO property_data \
             (data_int, data_decimal, data_date, data_nvarchar, data_ntext, node_id, version_id, property_type_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            Params::Positional(property_params(media, property)),
        )
        .await?;
    }
    Ok(())
}

/// Bring the property rows of the item's version in line with its collection
///
/// Rows of declared properties are updated or inserted; rows of property
/// types the content type no longer declares are removed.
pub(crate) async fn upsert_property_rows(
    conn: &Connection,
    media: &Media,
    metrics: &QueryMetrics,
) -> Result<(), RepositoryError> {
    for property in media.properties() {
        metrics.record(StatementKind::Write);
        let updated = conn
            .execute(
                "UPDATE property_data SET data_int = ?, data_decimal = ?, data_date = ?, \
                 data_nvarchar = ?, data_ntext = ? \
                 WHERE node_id = ? AND version_id = ? AND property_type_id = ?",
                Params::Positional(property_params(media, property)),
            )
            .await?;

        if updated == 0 {
            metrics.record(StatementKind::Write);
            conn.execute(
                "INSERT INTO property_data \
                 (data_int, data_decimal, data_date, data_nvarchar, data_ntext, node_id, version_id, property_type_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                Params::Positional(property_params(media, property)),
            )
            .await?;
        }
    }

    let declared: Vec<i64> = media
        .properties()
        .iter()
        .map(|p| p.property_type().id)
        .collect();
    metrics.record(StatementKind::Write);
    conn.execute(
        "DELETE FROM property_data WHERE node_id = ? AND version_id = ? \
         AND property_type_id NOT IN (SELECT value FROM json_each(?))",
        Params::Positional(vec![
            Value::Integer(media.id()),
            Value::Text(media.version_id().to_string()),
            json_list(&declared)?,
        ]),
    )
    .await?;

    Ok(())
}

/// Delete one version of an item with its property and preview rows
///
/// Every statement is scoped by both the item id and the version id, so other
/// versions of the item and other items are untouched. Returns `false` when the
/// item has no such version. Deleting the only version is refused.
pub(crate) async fn delete_version(
    conn: &Connection,
    id: i64,
    version_id: Uuid,
    metrics: &QueryMetrics,
) -> Result<bool, RepositoryError> {
    if !version_exists(conn, id, version_id, metrics).await? {
        return Ok(false);
    }
    if version_count(conn, id, metrics).await? <= 1 {
        return Err(RepositoryError::invalid_operation(format!(
            "Cannot delete version {} of media {}: it is the only version",
            version_id, id
        )));
    }

    let version = version_id.to_string();
    for statement in [
        "DELETE FROM property_data WHERE node_id = ? AND version_id = ?",
        "DELETE FROM preview_xml WHERE node_id = ? AND version_id = ?",
        "DELETE FROM content_version WHERE node_id = ? AND version_id = ?",
    ] {
        metrics.record(StatementKind::Write);
        conn.execute(statement, params![id, version.as_str()]).await?;
    }

    Ok(true)
}
