//! Repository Services
//!
//! This module contains the media repository and the pieces it is built from:
//!
//! - `MediaRepository` - retrieval, persistence and snapshot rebuild
//! - `MediaCache` - read-through cache gateway (in-memory and disabled)
//! - `ContentTypeProvider` / `TagSynchronizer` - external collaborators
//! - tree placement, sibling name resolution, version rows, batch loading
//!
//! Only the repository, the collaborator traits and the pure helpers are
//! public; statement building and materialization stay internal.

pub mod cache;
pub mod content_types;
pub mod error;
mod materializer;
pub mod media_repository;
mod property_loader;
pub mod rebuild;
mod select;
pub mod tags;
pub mod tree;
pub mod unique_name;
mod versions;

pub use cache::{CacheStats, DisabledMediaCache, InMemoryMediaCache, MediaCache};
pub use content_types::{ContentTypeProvider, ContentTypeRegistry};
pub use error::RepositoryError;
pub use media_repository::{MediaRepository, MediaRepositoryBuilder};
pub use property_loader::{DocumentDefinition, DocumentKey};
pub use rebuild::{RebuildOutcome, RebuildReport};
pub use tags::{NoopTagSynchronizer, TagSynchronizer};
pub use tree::{child_path, validate_path};
pub use unique_name::{compare_similar_names, resolve_unique_name};
