//! Column codecs shared by the read and write paths
//!
//! Timestamps are written as RFC 3339 with microsecond precision so that text
//! ordering in SQL matches chronological ordering. Property values are spread over
//! one typed column per storage kind, mirroring the `property_data` table.

use crate::db::DatabaseError;
use crate::models::{PropertyValue, ValueStorage};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::Value;
use uuid::Uuid;

/// Format a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse timestamp from database - handles both RFC3339 and SQLite formats
///
/// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(DatabaseError::decode_failed(
        "timestamp",
        s,
        "neither RFC 3339 nor SQLite format",
    ))
}

/// Parse a stored uuid column
pub fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::decode_failed("uuid", s, e))
}

/// The five typed columns of one `property_data` row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyColumns {
    pub data_int: Option<i64>,
    pub data_decimal: Option<f64>,
    pub data_date: Option<String>,
    pub data_nvarchar: Option<String>,
    pub data_ntext: Option<String>,
}

impl PropertyColumns {
    /// Spread a value into the column its storage kind dictates
    pub fn encode(storage: ValueStorage, value: Option<&PropertyValue>) -> Self {
        let mut columns = Self::default();
        let Some(value) = value else {
            return columns;
        };

        match (storage, value) {
            (ValueStorage::Integer, PropertyValue::Integer(i)) => columns.data_int = Some(*i),
            (ValueStorage::Decimal, PropertyValue::Decimal(d)) => columns.data_decimal = Some(*d),
            (ValueStorage::Decimal, PropertyValue::Integer(i)) => {
                columns.data_decimal = Some(*i as f64)
            }
            (ValueStorage::Date, PropertyValue::Date(dt)) => {
                columns.data_date = Some(format_timestamp(dt))
            }
            (ValueStorage::Nvarchar, v) => columns.data_nvarchar = Some(v.to_string()),
            (ValueStorage::Ntext, v) => columns.data_ntext = Some(v.to_string()),
            // Mismatches are rejected when the value is set; fall back to text.
            (_, v) => columns.data_nvarchar = Some(v.to_string()),
        }

        columns
    }

    /// Read the value back out of the column its storage kind dictates
    pub fn decode(&self, storage: ValueStorage) -> Result<Option<PropertyValue>, DatabaseError> {
        let value = match storage {
            ValueStorage::Integer => self.data_int.map(PropertyValue::Integer),
            ValueStorage::Decimal => self.data_decimal.map(PropertyValue::Decimal),
            ValueStorage::Date => match &self.data_date {
                Some(s) => Some(PropertyValue::Date(parse_timestamp(s)?)),
                None => None,
            },
            ValueStorage::Nvarchar => self.data_nvarchar.clone().map(PropertyValue::Text),
            ValueStorage::Ntext => self.data_ntext.clone().map(PropertyValue::Text),
        };
        Ok(value)
    }

    /// Column values in table order, for positional binding
    pub fn into_values(self) -> [Value; 5] {
        [
            self.data_int.map(Value::Integer).unwrap_or(Value::Null),
            self.data_decimal.map(Value::Real).unwrap_or(Value::Null),
            self.data_date.map(Value::Text).unwrap_or(Value::Null),
            self.data_nvarchar.map(Value::Text).unwrap_or(Value::Null),
            self.data_ntext.map(Value::Text).unwrap_or(Value::Null),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_both_formats() {
        let sqlite = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(sqlite, Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 30).unwrap());

        let rfc = parse_timestamp("2024-03-01T10:20:30.000001Z").unwrap();
        assert_eq!(format_timestamp(&rfc), "2024-03-01T10:20:30.000001Z");

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_formatted_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn test_columns_follow_storage_kind() {
        let columns = PropertyColumns::encode(
            ValueStorage::Ntext,
            Some(&PropertyValue::Text("long body".to_string())),
        );
        assert_eq!(columns.data_ntext.as_deref(), Some("long body"));
        assert!(columns.data_nvarchar.is_none());
        assert_eq!(
            columns.decode(ValueStorage::Ntext).unwrap(),
            Some(PropertyValue::Text("long body".to_string()))
        );

        let empty = PropertyColumns::encode(ValueStorage::Integer, None);
        assert_eq!(empty, PropertyColumns::default());
        assert_eq!(empty.decode(ValueStorage::Integer).unwrap(), None);
    }
}
