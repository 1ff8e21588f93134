//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{SourcePost, WatermarkMap};

/// Error type for post source operations
#[derive(Debug, Error)]
pub enum PostSourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Port for fetching posts from the source platform
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch up to `limit` of the account's most recent posts, in any order
    async fn fetch_recent(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<SourcePost>, PostSourceError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Platform-specific record ID
    pub id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Port for publishing post text to the destination platform
#[async_trait]
pub trait PostPublisher: Send + Sync {
    /// Publish raw text as a new post
    async fn publish(&self, text: &str) -> Result<PublishReceipt, PublishError>;
}

/// Error type for bookmark store operations
#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Port for persisting the per-account watermark map
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Load the persisted watermarks.
    ///
    /// Fails soft: a missing, unreadable, or corrupt store yields an empty
    /// map. Implementations log the condition and never raise to the caller.
    async fn load(&self) -> WatermarkMap;

    /// Replace the persisted watermarks with `watermarks`.
    ///
    /// A crash mid-write loses at most the latest update; it must not leave
    /// the store unrecoverable.
    async fn save(&self, watermarks: &WatermarkMap) -> Result<(), BookmarkError>;
}
