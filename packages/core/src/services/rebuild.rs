//! Snapshot tables and their bulk rebuild
//!
//! `content_xml` holds one serialized snapshot per live item and `preview_xml`
//! one per (item, version). Both are derived data: the rebuild regenerates
//! `content_xml` from the source rows.
//!
//! # Rebuild
//!
//! Non-trashed media are walked in groups ordered by ascending id. Each group
//! after the first starts strictly after the last id of the previous one, so
//! items deleted between groups shift nothing and no item is visited twice.
//! The walk ends when a group comes back empty.
//!
//! Each item is serialized by the caller's function and upserted on its own.
//! A failing item is logged, recorded as [`RebuildOutcome::Skipped`] and the
//! walk continues.

use crate::db::rows::format_timestamp;
use crate::db::{QueryMetrics, StatementKind};
use crate::models::Media;
use crate::services::cache::DisabledMediaCache;
use crate::services::content_types::ContentTypeProvider;
use crate::services::materializer::Materializer;
use crate::services::select::{fetch_base_rows, json_list, BaseRow, MediaSelect, SqlFilter};
use crate::services::RepositoryError;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of rebuilding one item's snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Upserted { id: i64 },
    Skipped { id: i64, cause: String },
}

impl RebuildOutcome {
    pub fn id(&self) -> i64 {
        match self {
            RebuildOutcome::Upserted { id } | RebuildOutcome::Skipped { id, .. } => *id,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RebuildOutcome::Skipped { .. })
    }
}

/// What a rebuild did, group by group and item by item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Number of items fetched by each non-empty group query
    pub group_sizes: Vec<usize>,
    /// One outcome per visited item, in visiting order
    pub outcomes: Vec<RebuildOutcome>,
}

impl RebuildReport {
    pub fn upserted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_skipped()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RebuildOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }
}

/// Write an item's live snapshot, updating in place or inserting
pub(crate) async fn upsert_content_xml(
    conn: &Connection,
    id: i64,
    xml: &str,
    metrics: &QueryMetrics,
) -> Result<(), RepositoryError> {
    metrics.record(StatementKind::Write);
    let updated = conn
        .execute(
            "UPDATE content_xml SET xml = ? WHERE node_id = ?",
            params![xml, id],
        )
        .await?;

    if updated == 0 {
        metrics.record(StatementKind::Write);
        conn.execute(
            "INSERT INTO content_xml (node_id, xml) VALUES (?, ?)",
            params![id, xml],
        )
        .await?;
    }

    Ok(())
}

/// Write the snapshot of one version, updating in place or inserting
pub(crate) async fn upsert_preview_xml(
    conn: &Connection,
    id: i64,
    version_id: Uuid,
    timestamp: DateTime<Utc>,
    xml: &str,
    metrics: &QueryMetrics,
) -> Result<(), RepositoryError> {
    let version = version_id.to_string();
    let timestamp = format_timestamp(&timestamp);

    metrics.record(StatementKind::Write);
    let updated = conn
        .execute(
            "UPDATE preview_xml SET xml = ?, timestamp = ? WHERE node_id = ? AND version_id = ?",
            params![xml, timestamp.as_str(), id, version.as_str()],
        )
        .await?;

    if updated == 0 {
        metrics.record(StatementKind::Write);
        conn.execute(
            "INSERT INTO preview_xml (node_id, version_id, timestamp, xml) VALUES (?, ?, ?, ?)",
            params![id, version.as_str(), timestamp.as_str(), xml],
        )
        .await?;
    }

    Ok(())
}

/// Group-wise regeneration of `content_xml`
pub(crate) struct SnapshotRebuilder<'a> {
    conn: &'a Connection,
    content_types: &'a dyn ContentTypeProvider,
    metrics: &'a QueryMetrics,
    group_size: usize,
}

impl<'a> SnapshotRebuilder<'a> {
    pub fn new(
        conn: &'a Connection,
        content_types: &'a dyn ContentTypeProvider,
        metrics: &'a QueryMetrics,
        group_size: usize,
    ) -> Self {
        Self {
            conn,
            content_types,
            metrics,
            group_size,
        }
    }

    fn group_select(
        &self,
        content_type_ids: Option<&[i64]>,
        after_id: Option<i64>,
    ) -> Result<MediaSelect, RepositoryError> {
        let mut filter = SqlFilter::new().and("n.trashed = 0", []);
        if let Some(ids) = content_type_ids {
            filter = filter.and(
                "c.content_type_id IN (SELECT value FROM json_each(?))",
                [json_list(ids)?],
            );
        }
        if let Some(after_id) = after_id {
            filter = filter.and("n.id > ?", [Value::Integer(after_id)]);
        }

        Ok(MediaSelect::current(filter)
            .order_by("n.id ASC")
            .limit(self.group_size))
    }

    /// Rebuild snapshots of all non-trashed media, optionally of some content types
    pub async fn run<F>(
        &self,
        content_type_ids: Option<&[i64]>,
        serializer: F,
    ) -> Result<RebuildReport, RepositoryError>
    where
        F: Fn(&Media) -> anyhow::Result<String>,
    {
        let cache = DisabledMediaCache;
        let materializer = Materializer::new(self.conn, self.content_types, &cache, self.metrics);
        let mut report = RebuildReport::default();
        let mut last_id = None;

        info!(
            "Rebuilding media snapshots in groups of {}",
            self.group_size
        );

        loop {
            let select = self.group_select(content_type_ids, last_id)?;
            let rows = fetch_base_rows(self.conn, &select, self.metrics).await?;
            let Some(last) = rows.last() else {
                break;
            };
            last_id = Some(last.record.id);
            report.group_sizes.push(rows.len());

            debug!(
                "Rebuilding group {} ({} items, last id {})",
                report.group_sizes.len(),
                rows.len(),
                last.record.id
            );

            for (id, media) in self.materialize_group(&materializer, rows).await {
                let outcome = match media {
                    Ok(media) => self.write_snapshot(&media, &serializer).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => report.outcomes.push(RebuildOutcome::Upserted { id }),
                    Err(e) => {
                        warn!("Failed to rebuild snapshot for media {}: {}", id, e);
                        report.outcomes.push(RebuildOutcome::Skipped {
                            id,
                            cause: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Rebuilt {} media snapshots, skipped {}",
            report.upserted_count(),
            report.outcomes.len() - report.upserted_count()
        );

        Ok(report)
    }

    /// Materialize a group, falling back to one item at a time when the batch fails
    async fn materialize_group(
        &self,
        materializer: &Materializer<'_>,
        rows: Vec<BaseRow>,
    ) -> Vec<(i64, Result<Media, RepositoryError>)> {
        let ids: Vec<i64> = rows.iter().map(|r| r.record.id).collect();

        match materializer.materialize(rows.clone(), false).await {
            Ok(items) => ids.into_iter().zip(items.into_iter().map(Ok)).collect(),
            Err(e) => {
                debug!("Group materialization failed ({}), retrying per item", e);
                let mut results = Vec::with_capacity(rows.len());
                for row in rows {
                    let id = row.record.id;
                    let item = materializer
                        .materialize(vec![row], false)
                        .await
                        .and_then(|mut items| {
                            items.pop().ok_or_else(|| {
                                RepositoryError::structural(format!(
                                    "Media {} vanished during materialization",
                                    id
                                ))
                            })
                        });
                    results.push((id, item));
                }
                results
            }
        }
    }

    async fn write_snapshot<F>(&self, media: &Media, serializer: &F) -> Result<(), RepositoryError>
    where
        F: Fn(&Media) -> anyhow::Result<String>,
    {
        let xml = serializer(media).map_err(RepositoryError::Collaborator)?;
        upsert_content_xml(self.conn, media.id(), &xml, self.metrics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = RebuildReport {
            group_sizes: vec![2, 1],
            outcomes: vec![
                RebuildOutcome::Upserted { id: 10 },
                RebuildOutcome::Skipped {
                    id: 11,
                    cause: "boom".to_string(),
                },
                RebuildOutcome::Upserted { id: 12 },
            ],
        };
        assert_eq!(report.upserted_count(), 2);
        assert_eq!(report.skipped().map(RebuildOutcome::id).collect::<Vec<_>>(), vec![11]);
    }
}
