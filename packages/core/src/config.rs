//! Configuration for the media repository

use serde::{Deserialize, Serialize};

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;

/// Upper bound for a rebuild group
const MAX_REBUILD_GROUP_SIZE: usize = 100_000;

/// Repository behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Resolve sibling name collisions by appending " (n)"
    pub ensure_unique_naming: bool,

    /// Use an in-memory read-through cache for id lookups
    pub cache_enabled: bool,

    /// Default group size for snapshot rebuilds
    pub rebuild_group_size: usize,

    /// SQLite busy timeout per connection, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            ensure_unique_naming: true,
            cache_enabled: true,
            rebuild_group_size: 1000,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl RepositoryConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rebuild_group_size == 0 {
            return Err("rebuild_group_size must be greater than 0".to_string());
        }

        if self.rebuild_group_size > MAX_REBUILD_GROUP_SIZE {
            return Err(format!(
                "rebuild_group_size cannot exceed {}",
                MAX_REBUILD_GROUP_SIZE
            ));
        }

        Ok(())
    }
}
