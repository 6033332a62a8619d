//! Property values and collections
//!
//! A [`PropertyCollection`] always has exactly the shape its content type
//! declares: one [`Property`] per declared [`PropertyType`], with `None` for
//! values that have never been set.

use crate::models::{ContentType, PropertyType, ValidationError, ValueStorage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Typed value of one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Decimal(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl PropertyValue {
    /// Whether this value can be stored in the given column kind
    pub fn fits(&self, storage: ValueStorage) -> bool {
        matches!(
            (storage, self),
            (ValueStorage::Integer, PropertyValue::Integer(_))
                | (ValueStorage::Decimal, PropertyValue::Decimal(_))
                | (ValueStorage::Decimal, PropertyValue::Integer(_))
                | (ValueStorage::Date, PropertyValue::Date(_))
                | (ValueStorage::Nvarchar, _)
                | (ValueStorage::Ntext, _)
        )
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Decimal(d) => write!(f, "{}", d),
            PropertyValue::Date(dt) => write!(f, "{}", dt.to_rfc3339()),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Decimal(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

/// One property of a media item, bound to a version
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    property_type: PropertyType,
    version_id: Uuid,
    value: Option<PropertyValue>,
    dirty: bool,
}

impl Property {
    pub fn new(property_type: PropertyType, version_id: Uuid) -> Self {
        Self {
            property_type,
            version_id,
            value: None,
            dirty: false,
        }
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    pub fn alias(&self) -> &str {
        &self.property_type.alias
    }

    pub fn version_id(&self) -> Uuid {
        self.version_id
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Set the value, rejecting values the storage column cannot hold
    pub fn set_value(&mut self, value: Option<PropertyValue>) -> Result<(), ValidationError> {
        if let Some(v) = &value {
            if !v.fits(self.property_type.storage) {
                return Err(ValidationError::ValueTypeMismatch {
                    alias: self.property_type.alias.clone(),
                    storage: self.property_type.storage,
                });
            }
        }
        if self.value != value {
            self.value = value;
            self.dirty = true;
        }
        Ok(())
    }

    /// Load a value read from storage without marking the property dirty
    pub(crate) fn load_value(&mut self, value: Option<PropertyValue>) {
        self.value = value;
    }

    pub(crate) fn set_version_id(&mut self, version_id: Uuid) {
        self.version_id = version_id;
    }

    pub(crate) fn reset_dirty(&mut self) {
        self.dirty = false;
    }
}

/// The full set of properties of one media version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyCollection {
    properties: Vec<Property>,
}

impl PropertyCollection {
    /// Build an empty-valued collection with the shape `content_type` declares
    pub fn for_content_type(content_type: &ContentType, version_id: Uuid) -> Self {
        Self {
            properties: content_type
                .property_types
                .iter()
                .cloned()
                .map(|pt| Property::new(pt, version_id))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn get(&self, alias: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.alias() == alias)
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.alias() == alias)
    }

    pub(crate) fn get_by_type_id_mut(&mut self, property_type_id: i64) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .find(|p| p.property_type.id == property_type_id)
    }

    /// Value of a property by alias, if declared and set
    pub fn value(&self, alias: &str) -> Option<&PropertyValue> {
        self.get(alias).and_then(Property::value)
    }

    pub fn is_dirty(&self) -> bool {
        self.properties.iter().any(Property::is_dirty)
    }

    pub(crate) fn set_version_id(&mut self, version_id: Uuid) {
        for property in &mut self.properties {
            property.set_version_id(version_id);
        }
    }

    pub(crate) fn reset_dirty(&mut self) {
        for property in &mut self.properties {
            property.reset_dirty();
        }
    }
}

impl<'a> IntoIterator for &'a PropertyCollection {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}
