//! Content Type (type descriptor) structures
//!
//! A content type declares which properties a media item may carry. The
//! repository only reads content types through a
//! [`ContentTypeProvider`](crate::services::ContentTypeProvider); it never
//! persists them.

use serde::{Deserialize, Serialize};

/// Storage column a property value is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueStorage {
    Integer,
    Decimal,
    Date,
    Nvarchar,
    Ntext,
}

/// One declared property of a content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyType {
    pub id: i64,
    pub alias: String,
    pub name: String,
    pub storage: ValueStorage,
    /// Tag-valued properties are mirrored into the tag index after writes
    #[serde(default)]
    pub is_tags: bool,
}

impl PropertyType {
    pub fn new(id: i64, alias: impl Into<String>, storage: ValueStorage) -> Self {
        let alias = alias.into();
        Self {
            id,
            name: alias.clone(),
            alias,
            storage,
            is_tags: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn tags(mut self) -> Self {
        self.is_tags = true;
        self
    }
}

/// Type descriptor for media items
///
/// # Examples
///
/// ```rust
/// use mediastore_core::models::{ContentType, PropertyType, ValueStorage};
///
/// let image = ContentType::new(1032, "image", "Image")
///     .with_property_type(PropertyType::new(6, "umbracoFile", ValueStorage::Nvarchar))
///     .with_property_type(PropertyType::new(7, "umbracoWidth", ValueStorage::Integer));
///
/// assert_eq!(image.property_types.len(), 2);
/// assert!(image.property_type("umbracoWidth").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub id: i64,
    pub alias: String,
    pub name: String,
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
}

impl ContentType {
    pub fn new(id: i64, alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            alias: alias.into(),
            name: name.into(),
            property_types: Vec::new(),
        }
    }

    pub fn with_property_type(mut self, property_type: PropertyType) -> Self {
        self.property_types.push(property_type);
        self
    }

    /// Look up a declared property type by alias (case-sensitive)
    pub fn property_type(&self, alias: &str) -> Option<&PropertyType> {
        self.property_types.iter().find(|pt| pt.alias == alias)
    }

    /// Whether any declared property is tag-valued
    pub fn has_tag_properties(&self) -> bool {
        self.property_types.iter().any(|pt| pt.is_tags)
    }
}
