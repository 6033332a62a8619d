//! Base row selection
//!
//! Every read path selects the same joined shape (node + content + version) and
//! differs only in its filter, its version scope and its ordering. This module
//! builds those statements and decodes their rows into [`BaseRow`]s.

use crate::db::rows::{parse_timestamp, parse_uuid};
use crate::db::{QueryMetrics, StatementKind};
use crate::models::{Direction, MediaQuery, MediaRecord, SortField, MEDIA_OBJECT_TYPE};
use crate::services::RepositoryError;
use libsql::params::Params;
use libsql::{Connection, Row, Value};

/// Columns of the joined base row, in decode order
const BASE_COLUMNS: &str = "n.id, n.unique_id, n.parent_id, n.level, n.path, n.sort_order, \
     n.trashed, v.text, n.create_date, v.content_type_id, v.version_id, v.version_date";

const BASE_FROM: &str = "FROM node n \
     JOIN content c ON c.node_id = n.id \
     JOIN content_version v ON v.node_id = n.id";

/// Restricts the join to the latest version of each node
const CURRENT_VERSION_CLAUSE: &str = "v.id = (SELECT cv.id FROM content_version cv \
     WHERE cv.node_id = n.id ORDER BY cv.version_date DESC, cv.id DESC LIMIT 1)";

/// Escape `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn like_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Bound for LIMIT and OFFSET values
///
/// SQLite reads a negative LIMIT as "no limit" and a negative OFFSET as 0, so
/// values past `i64::MAX` are pinned there instead of wrapping.
fn clamp_to_sql(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// JSON array parameter for `IN (SELECT value FROM json_each(?))`
pub(crate) fn json_list<T: serde::Serialize>(items: &[T]) -> Result<Value, RepositoryError> {
    serde_json::to_string(items)
        .map(Value::Text)
        .map_err(|e| RepositoryError::invalid_data(format!("Failed to encode id list: {}", e)))
}

/// Conjunction of WHERE clauses with their positional parameters
#[derive(Debug, Clone, Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one clause; `params` must match its `?` placeholders in order
    pub fn and(mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        self.clauses.push(clause.into());
        self.params.extend(params);
        self
    }

    /// Translate a media query into clauses over the `n`/`c`/`v` aliases
    pub fn from_query(query: &MediaQuery) -> Result<Self, RepositoryError> {
        let mut filter = Self::new();

        if let Some(ids) = &query.ids {
            filter = filter.and("n.id IN (SELECT value FROM json_each(?))", [json_list(ids)?]);
        }
        if let Some(parent_id) = query.parent_id {
            filter = filter.and("n.parent_id = ?", [Value::Integer(parent_id)]);
        }
        match query.is_root {
            Some(true) => filter = filter.and("n.parent_id IS NULL", []),
            Some(false) => filter = filter.and("n.parent_id IS NOT NULL", []),
            None => {}
        }
        if let Some(content_type_ids) = &query.content_type_ids {
            filter = filter.and(
                "c.content_type_id IN (SELECT value FROM json_each(?))",
                [json_list(content_type_ids)?],
            );
        }
        if let Some(trashed) = query.trashed {
            filter = filter.and("n.trashed = ?", [Value::Integer(trashed as i64)]);
        }
        if let Some(level) = query.level {
            filter = filter.and("n.level = ?", [Value::Integer(level)]);
        }
        if let Some(path) = &query.descendants_of_path {
            filter = filter.and(
                "n.path LIKE ? ESCAPE '\\'",
                [Value::Text(format!("{},%", like_escape(path)))],
            );
        }
        if let Some(text) = &query.name_contains {
            filter = filter.and(
                "n.text LIKE ? ESCAPE '\\'",
                [Value::Text(format!("%{}%", like_escape(text)))],
            );
        }

        Ok(filter)
    }

    fn write_clauses(&self, sql: &mut String) {
        for clause in &self.clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
    }
}

/// Which versions a selection returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionScope {
    /// One row per node: its latest version
    Current,
    /// One row per version
    All,
}

/// A base row selection statement
#[derive(Debug, Clone)]
pub(crate) struct MediaSelect {
    filter: SqlFilter,
    versions: VersionScope,
    order_by: String,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl MediaSelect {
    pub fn current(filter: SqlFilter) -> Self {
        Self {
            filter,
            versions: VersionScope::Current,
            order_by: "n.id ASC".to_string(),
            limit: None,
            offset: None,
        }
    }

    pub fn all_versions(filter: SqlFilter) -> Self {
        Self {
            versions: VersionScope::All,
            ..Self::current(filter)
        }
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    /// Order by a sortable field, ties broken by id
    pub fn order_by_field(self, field: SortField, direction: Direction) -> Self {
        let column = match field {
            SortField::Id => "n.id",
            SortField::Name => "n.text COLLATE NOCASE",
            SortField::SortOrder => "n.sort_order",
            SortField::Path => "n.path",
            SortField::Level => "n.level",
            SortField::CreateDate => "n.create_date",
            SortField::UpdateDate => "v.version_date",
        };
        let direction = match direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        self.order_by(format!("{} {}, n.id {}", column, direction, direction))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    fn where_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE n.node_object_type = ?");
        let mut params = vec![Value::Text(MEDIA_OBJECT_TYPE.to_string())];

        if self.versions == VersionScope::Current {
            sql.push_str(" AND ");
            sql.push_str(CURRENT_VERSION_CLAUSE);
        }
        self.filter.write_clauses(&mut sql);
        params.extend(self.filter.params.iter().cloned());

        (sql, params)
    }

    /// Row selection statement
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let (where_sql, mut params) = self.where_sql();
        let mut sql = format!(
            "SELECT {} {}{} ORDER BY {}",
            BASE_COLUMNS, BASE_FROM, where_sql, self.order_by
        );

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(Value::Integer(clamp_to_sql(limit)));
                params.push(Value::Integer(clamp_to_sql(offset.unwrap_or(0))));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Value::Integer(clamp_to_sql(offset)));
            }
            (None, None) => {}
        }

        (sql, params)
    }

    /// Count statement over the same rows, ignoring paging
    pub fn to_count_sql(&self) -> (String, Vec<Value>) {
        let (where_sql, params) = self.where_sql();
        (format!("SELECT COUNT(*) {}{}", BASE_FROM, where_sql), params)
    }
}

/// One decoded base row
#[derive(Debug, Clone)]
pub(crate) struct BaseRow {
    pub record: MediaRecord,
    pub content_type_id: i64,
}

fn decode_base_row(row: &Row) -> Result<BaseRow, RepositoryError> {
    let id: i64 = row.get(0)?;
    let key: String = row.get(1)?;
    let parent_id: Option<i64> = row.get(2)?;
    let level: i64 = row.get(3)?;
    let path: String = row.get(4)?;
    let sort_order: i64 = row.get(5)?;
    let trashed: i64 = row.get(6)?;
    let name: String = row.get(7)?;
    let create_date: String = row.get(8)?;
    let content_type_id: i64 = row.get(9)?;
    let version_id: String = row.get(10)?;
    let version_date: String = row.get(11)?;

    Ok(BaseRow {
        record: MediaRecord {
            id,
            key: parse_uuid(&key)?,
            parent_id,
            level,
            path,
            sort_order,
            trashed: trashed != 0,
            name,
            create_date: parse_timestamp(&create_date)?,
            version_id: parse_uuid(&version_id)?,
            version_date: parse_timestamp(&version_date)?,
        },
        content_type_id,
    })
}

/// Run a selection and decode every row
pub(crate) async fn fetch_base_rows(
    conn: &Connection,
    select: &MediaSelect,
    metrics: &QueryMetrics,
) -> Result<Vec<BaseRow>, RepositoryError> {
    let (sql, params) = select.to_sql();
    metrics.record(StatementKind::Base);

    let mut rows = conn.query(&sql, Params::Positional(params)).await?;
    let mut base_rows = Vec::new();
    while let Some(row) = rows.next().await? {
        base_rows.push(decode_base_row(&row)?);
    }

    Ok(base_rows)
}

/// Count the rows a selection would return without paging
pub(crate) async fn count_rows(
    conn: &Connection,
    select: &MediaSelect,
    metrics: &QueryMetrics,
) -> Result<u64, RepositoryError> {
    let (sql, params) = select.to_count_sql();
    metrics.record(StatementKind::Count);

    let mut rows = conn.query(&sql, Params::Positional(params)).await?;
    let count: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };

    Ok(count.max(0) as u64)
}
