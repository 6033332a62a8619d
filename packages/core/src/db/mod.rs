//! Database Layer
//!
//! This module handles the storage-level concerns of the media store:
//!
//! - Database initialization and connection management (libsql)
//! - The normalized relational schema (node, content, version, property rows)
//! - Column codecs for timestamps, uuids and typed property values
//! - Statement metrics
//!
//! Repository logic (tree invariants, batching, caching) lives in
//! [`crate::services`]; this layer never interprets rows beyond decoding them.

mod database;
mod error;
pub mod metrics;
pub mod rows;

pub use database::{DatabaseService, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::DatabaseError;
pub use metrics::{MetricsSnapshot, QueryMetrics, StatementKind};
