//! MediaStore Core - Media Repository Engine
//!
//! This crate stores a tree of versioned media items in an embedded database
//! and loads them back in batches.
//!
//! # Architecture
//!
//! - **Normalized schema**: a shared `node` table plus content, version and
//!   typed property tables
//! - **Batch materialization**: one base statement and one property statement
//!   per read, whatever the number of items
//! - **Tree invariants**: path, level and sort order are computed on insert and
//!   on parent change, and follow a moved subtree
//! - **libsql**: embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (Media, ContentType, queries)
//! - [`services`] - MediaRepository and its collaborators
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Repository configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::RepositoryConfig;
pub use models::*;
pub use services::*;
