//! Tag index synchronization hook
//!
//! After every successful insert or update the repository hands the saved item
//! to a [`TagSynchronizer`] so that tag-valued properties stay mirrored in the
//! tag index. The repository logs failures and carries on.

use crate::models::{ContentType, Media};
use async_trait::async_trait;

#[async_trait]
pub trait TagSynchronizer: Send + Sync {
    async fn synchronize(&self, media: &Media, content_type: &ContentType) -> anyhow::Result<()>;
}

/// Synchronizer that does nothing, for stores without a tag index
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTagSynchronizer;

#[async_trait]
impl TagSynchronizer for NoopTagSynchronizer {
    async fn synchronize(&self, _media: &Media, _content_type: &ContentType) -> anyhow::Result<()> {
        Ok(())
    }
}
