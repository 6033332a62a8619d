//! Media entity
//!
//! A [`Media`] is one node of the media tree together with the version it was
//! loaded at and that version's property values.
//!
//! # Tree fields
//!
//! - `path`: comma-joined ancestor ids ending in the item's own id
//! - `level`: depth, with root items on level 1
//! - `sort_order`: zero-based position among siblings of the same object type
//!
//! These are computed by the repository on insert and on parent changes; callers
//! only choose the parent.
//!
//! # Change tracking
//!
//! Every public setter records which field changed. The repository uses the
//! record to decide what to recompute (a move is only processed when
//! `ParentId` is dirty) and clears it after every load and every save.
//!
//! ```rust
//! use mediastore_core::models::{ContentType, Media, MediaField};
//! use std::sync::Arc;
//!
//! let folder = Arc::new(ContentType::new(1031, "folder", "Folder"));
//! let mut media = Media::new("Holiday", None, folder);
//! assert!(!media.has_identity());
//!
//! media.set_parent_id(Some(1050));
//! assert!(media.is_property_dirty(MediaField::ParentId));
//! ```

use crate::models::{
    ContentType, PropertyCollection, PropertyValue, ValidationError, MEDIA_RECYCLE_BIN_ID,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Tracked fields of a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaField {
    Name,
    ParentId,
    SortOrder,
    Level,
    Path,
    Trashed,
    ContentType,
    Version,
}

/// Stored state of a media item, as decoded from one joined row
#[derive(Debug, Clone)]
pub(crate) struct MediaRecord {
    pub id: i64,
    pub key: Uuid,
    pub parent_id: Option<i64>,
    pub level: i64,
    pub path: String,
    pub sort_order: i64,
    pub trashed: bool,
    pub name: String,
    pub create_date: DateTime<Utc>,
    pub version_id: Uuid,
    pub version_date: DateTime<Utc>,
}

/// A versioned media node
#[derive(Debug, Clone)]
pub struct Media {
    id: i64,
    key: Uuid,
    parent_id: Option<i64>,
    path: String,
    level: i64,
    sort_order: i64,
    trashed: bool,
    name: String,
    content_type: Arc<ContentType>,
    version_id: Uuid,
    create_date: DateTime<Utc>,
    update_date: DateTime<Utc>,
    properties: PropertyCollection,
    changed: BTreeSet<MediaField>,
}

impl Media {
    /// Create a new, not yet persisted media item
    ///
    /// The item gets a fresh key and version id and an empty-valued property
    /// collection shaped by `content_type`.
    pub fn new(
        name: impl Into<String>,
        parent_id: Option<i64>,
        content_type: Arc<ContentType>,
    ) -> Self {
        let now = Utc::now();
        let version_id = Uuid::new_v4();
        let properties = PropertyCollection::for_content_type(&content_type, version_id);

        Self {
            id: 0,
            key: Uuid::new_v4(),
            parent_id,
            path: String::new(),
            level: 0,
            sort_order: 0,
            trashed: false,
            name: name.into(),
            content_type,
            version_id,
            create_date: now,
            update_date: now,
            properties,
            changed: BTreeSet::new(),
        }
    }

    /// Rebuild an item from its stored row, without properties attached yet
    pub(crate) fn from_record(record: MediaRecord, content_type: Arc<ContentType>) -> Self {
        let properties = PropertyCollection::for_content_type(&content_type, record.version_id);
        Self {
            id: record.id,
            key: record.key,
            parent_id: record.parent_id,
            path: record.path,
            level: record.level,
            sort_order: record.sort_order,
            trashed: record.trashed,
            name: record.name,
            content_type,
            version_id: record.version_id,
            create_date: record.create_date,
            update_date: record.version_date,
            properties,
            changed: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Whether the item has been assigned a row id
    pub fn has_identity(&self) -> bool {
        self.id != 0
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn level(&self) -> i64 {
        self.level
    }

    pub fn sort_order(&self) -> i64 {
        self.sort_order
    }

    pub fn trashed(&self) -> bool {
        self.trashed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &Arc<ContentType> {
        &self.content_type
    }

    pub fn content_type_id(&self) -> i64 {
        self.content_type.id
    }

    pub fn version_id(&self) -> Uuid {
        self.version_id
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    /// Timestamp of the loaded version
    pub fn update_date(&self) -> DateTime<Utc> {
        self.update_date
    }

    pub fn properties(&self) -> &PropertyCollection {
        &self.properties
    }

    /// Whether the item sits in the recycle bin directly
    pub fn is_in_recycle_bin(&self) -> bool {
        self.parent_id == Some(MEDIA_RECYCLE_BIN_ID)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.changed.insert(MediaField::Name);
        }
    }

    pub fn set_parent_id(&mut self, parent_id: Option<i64>) {
        if self.parent_id != parent_id {
            self.parent_id = parent_id;
            self.changed.insert(MediaField::ParentId);
        }
    }

    /// Swap the content type, reshaping the property collection
    ///
    /// Values of properties whose alias exists in both types are carried over.
    pub fn set_content_type(&mut self, content_type: Arc<ContentType>) {
        if self.content_type.id == content_type.id {
            return;
        }
        let mut properties = PropertyCollection::for_content_type(&content_type, self.version_id);
        for old in &self.properties {
            if let Some(new) = properties.get_mut(old.alias()) {
                // A storage mismatch simply drops the old value.
                let _ = new.set_value(old.value().cloned());
            }
        }
        self.properties = properties;
        self.content_type = content_type;
        self.changed.insert(MediaField::ContentType);
    }

    /// Set a property value by alias
    pub fn set_property_value(
        &mut self,
        alias: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), ValidationError> {
        let property = self
            .properties
            .get_mut(alias)
            .ok_or_else(|| ValidationError::UnknownProperty(alias.to_string()))?;
        property.set_value(Some(value.into()))
    }

    /// Clear a property value by alias
    pub fn clear_property_value(&mut self, alias: &str) -> Result<(), ValidationError> {
        let property = self
            .properties
            .get_mut(alias)
            .ok_or_else(|| ValidationError::UnknownProperty(alias.to_string()))?;
        property.set_value(None)
    }

    /// Start a new version: the next save writes a new version row and a new
    /// set of property rows, leaving the current ones as history.
    pub fn new_version(&mut self) {
        self.version_id = Uuid::new_v4();
        self.properties.set_version_id(self.version_id);
        self.changed.insert(MediaField::Version);
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty() || self.properties.is_dirty()
    }

    pub fn is_property_dirty(&self, field: MediaField) -> bool {
        self.changed.contains(&field)
    }

    /// Fields changed since the last load or save
    pub fn dirty_fields(&self) -> impl Iterator<Item = MediaField> + '_ {
        self.changed.iter().copied()
    }

    /// Forget all recorded changes, including property changes
    pub fn reset_dirty_properties(&mut self) {
        self.changed.clear();
        self.properties.reset_dirty();
    }

    pub(crate) fn set_identity(&mut self, id: i64) {
        self.id = id;
    }

    pub(crate) fn set_path(&mut self, path: String) {
        if self.path != path {
            self.path = path;
            self.changed.insert(MediaField::Path);
        }
    }

    pub(crate) fn set_level(&mut self, level: i64) {
        if self.level != level {
            self.level = level;
            self.changed.insert(MediaField::Level);
        }
    }

    pub(crate) fn set_sort_order(&mut self, sort_order: i64) {
        if self.sort_order != sort_order {
            self.sort_order = sort_order;
            self.changed.insert(MediaField::SortOrder);
        }
    }

    pub(crate) fn set_trashed(&mut self, trashed: bool) {
        if self.trashed != trashed {
            self.trashed = trashed;
            self.changed.insert(MediaField::Trashed);
        }
    }

    pub(crate) fn set_update_date(&mut self, update_date: DateTime<Utc>) {
        self.update_date = update_date;
    }

    pub(crate) fn attach_properties(&mut self, properties: PropertyCollection) {
        self.properties = properties;
    }
}
