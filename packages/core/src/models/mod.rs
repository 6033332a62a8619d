//! Data Models
//!
//! Entity and query structures of the media store:
//!
//! - [`Media`] - the versioned tree node, with change tracking
//! - [`ContentType`] / [`PropertyType`] - type descriptors
//! - [`PropertyCollection`] / [`PropertyValue`] - typed property values
//! - [`MediaQuery`] / [`PagedQuery`] - retrieval filters

pub mod content_type;
pub mod media;
pub mod property;
pub mod query;

pub use content_type::{ContentType, PropertyType, ValueStorage};
pub use media::{Media, MediaField};
pub(crate) use media::MediaRecord;
pub use property::{Property, PropertyCollection, PropertyValue};
pub use query::{Direction, MediaQuery, Page, PagedQuery, SortField};

use thiserror::Error;

/// Object type tag of media rows in the shared `node` table
pub const MEDIA_OBJECT_TYPE: &str = "b796f64c-1f99-4ffb-b886-4bf4bc011a1c";

/// Object type tag of the media recycle bin container
pub const RECYCLE_BIN_OBJECT_TYPE: &str = "cf3d8e34-1c1c-41e9-ae56-878b57b32113";

/// Reserved id of the media recycle bin container
pub const MEDIA_RECYCLE_BIN_ID: i64 = -21;

/// Validation errors for media edits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown property alias: {0}")]
    UnknownProperty(String),

    #[error("Value does not fit {storage:?} storage of property '{alias}'")]
    ValueTypeMismatch {
        alias: String,
        storage: ValueStorage,
    },

    #[error("Media name cannot be empty")]
    EmptyName,
}
