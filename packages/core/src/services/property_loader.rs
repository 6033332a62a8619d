//! Batch property loading
//!
//! Loads the property values of many (id, version) pairs with a single
//! statement. The id and version sets travel as JSON arrays and are expanded
//! with `json_each`, so the statement text does not grow with the batch and no
//! bound-parameter limit applies.
//!
//! Rows are grouped by the exact (id, version) pair they belong to. A row whose
//! node id is requested but whose version belongs to a different requested
//! pair never reaches the wrong collection.

use crate::db::rows::{parse_uuid, PropertyColumns};
use crate::db::{QueryMetrics, StatementKind};
use crate::models::{ContentType, PropertyCollection};
use crate::services::select::json_list;
use crate::services::RepositoryError;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::Connection;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one stored version of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub id: i64,
    pub version_id: Uuid,
}

/// What the loader needs to know about a version to shape its properties
#[derive(Debug, Clone)]
pub struct DocumentDefinition {
    pub id: i64,
    pub version_id: Uuid,
    pub version_date: DateTime<Utc>,
    pub create_date: DateTime<Utc>,
    pub content_type: Arc<ContentType>,
}

impl DocumentDefinition {
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            id: self.id,
            version_id: self.version_id,
        }
    }
}

const PROPERTY_SELECT: &str = "SELECT pd.node_id, pd.version_id, pd.property_type_id, \
     pd.data_int, pd.data_decimal, pd.data_date, pd.data_nvarchar, pd.data_ntext \
     FROM property_data pd \
     WHERE pd.node_id IN (SELECT value FROM json_each(?)) \
     AND pd.version_id IN (SELECT value FROM json_each(?))";

/// Load property collections for every definition
///
/// Issues exactly one statement for a non-empty batch and none for an empty
/// one. Every definition gets a collection in the result, shaped by its content
/// type; stored values are filled in where present.
pub(crate) async fn load_properties(
    conn: &Connection,
    definitions: &[DocumentDefinition],
    metrics: &QueryMetrics,
) -> Result<HashMap<DocumentKey, PropertyCollection>, RepositoryError> {
    if definitions.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<i64> = definitions
        .iter()
        .map(|d| d.id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let version_ids: Vec<String> = definitions
        .iter()
        .map(|d| d.version_id.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    metrics.record(StatementKind::Property);
    let mut rows = conn
        .query(
            PROPERTY_SELECT,
            Params::Positional(vec![json_list(&ids)?, json_list(&version_ids)?]),
        )
        .await?;

    let mut stored: HashMap<DocumentKey, Vec<(i64, PropertyColumns)>> = HashMap::new();
    while let Some(row) = rows.next().await? {
        let id: i64 = row.get(0)?;
        let version_id: String = row.get(1)?;
        let property_type_id: i64 = row.get(2)?;
        let columns = PropertyColumns {
            data_int: row.get(3)?,
            data_decimal: row.get(4)?,
            data_date: row.get(5)?,
            data_nvarchar: row.get(6)?,
            data_ntext: row.get(7)?,
        };

        let key = DocumentKey {
            id,
            version_id: parse_uuid(&version_id)?,
        };
        stored.entry(key).or_default().push((property_type_id, columns));
    }

    let mut collections = HashMap::with_capacity(definitions.len());
    for definition in definitions {
        let key = definition.key();
        if collections.contains_key(&key) {
            continue;
        }

        let mut collection =
            PropertyCollection::for_content_type(&definition.content_type, definition.version_id);
        if let Some(values) = stored.get(&key) {
            for (property_type_id, columns) in values {
                match collection.get_by_type_id_mut(*property_type_id) {
                    Some(property) => {
                        let value = columns.decode(property.property_type().storage)?;
                        property.load_value(value);
                    }
                    None => tracing::debug!(
                        "Ignoring property type {} on media {}: not declared by content type {}",
                        property_type_id,
                        key.id,
                        definition.content_type.id
                    ),
                }
            }
        }
        collections.insert(key, collection);
    }

    Ok(collections)
}
