//! Query structures for media retrieval
//!
//! [`MediaQuery`] narrows the set of media items; [`PagedQuery`] adds paging,
//! a name filter and ordering on top of it.
//!
//! ```rust
//! use mediastore_core::models::{Direction, MediaQuery, PagedQuery, SortField};
//!
//! let query = MediaQuery::new().with_parent_id(1050).with_trashed(false);
//! let paged = PagedQuery::new(query, 0, 25)
//!     .with_filter("holiday")
//!     .with_order_by(SortField::Name, Direction::Ascending);
//! assert_eq!(paged.page_size, 25);
//! ```

use serde::{Deserialize, Serialize};

/// Filter over live media items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaQuery {
    /// Only these ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,

    /// Only direct children of this parent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,

    /// Only root items (no parent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,

    /// Only these content types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type_ids: Option<Vec<i64>>,

    /// Only trashed / non-trashed items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,

    /// Only items on this level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,

    /// Only descendants of the item with this path (exclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants_of_path: Option<String>,

    /// Case-insensitive name substring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
}

impl MediaQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_parent_id(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_is_root(mut self, is_root: bool) -> Self {
        self.is_root = Some(is_root);
        self
    }

    pub fn with_content_type_ids(mut self, content_type_ids: Vec<i64>) -> Self {
        self.content_type_ids = Some(content_type_ids);
        self
    }

    pub fn with_trashed(mut self, trashed: bool) -> Self {
        self.trashed = Some(trashed);
        self
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_descendants_of_path(mut self, path: impl Into<String>) -> Self {
        self.descendants_of_path = Some(path.into());
        self
    }

    pub fn with_name_contains(mut self, text: impl Into<String>) -> Self {
        self.name_contains = Some(text.into());
        self
    }
}

/// Sortable fields for paged queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Id,
    Name,
    #[default]
    SortOrder,
    Path,
    Level,
    CreateDate,
    UpdateDate,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// One page of a filtered, ordered media listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedQuery {
    pub query: MediaQuery,
    /// Zero-based page index
    pub page_index: usize,
    pub page_size: usize,
    /// Substring matched against the display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: SortField,
    #[serde(default)]
    pub direction: Direction,
}

impl PagedQuery {
    pub fn new(query: MediaQuery, page_index: usize, page_size: usize) -> Self {
        Self {
            query,
            page_index,
            page_size,
            filter: None,
            order_by: SortField::default(),
            direction: Direction::default(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by(mut self, order_by: SortField, direction: Direction) -> Self {
        self.order_by = order_by;
        self.direction = direction;
        self
    }
}

/// A page of results plus the total number of matching items
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page_index: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }
}
