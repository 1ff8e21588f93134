//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// An account on the source platform whose posts are forwarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAccount {
    /// Username/handle without the leading @
    pub username: String,
}

impl MonitoredAccount {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// A source post from the watched platform (X/Twitter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePost {
    /// Platform-specific post ID; monotonic, compared as an opaque ordered string
    pub id: String,
    /// Post text content
    pub text: String,
    /// Author username/handle
    pub author: String,
    /// URL to the original post
    pub url: String,
    /// When the post was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Whether this is a repost/retweet
    pub is_repost: bool,
    /// URL tokens exactly as they appear in the text (shortener form)
    pub urls: Vec<String>,
}

/// Per-account watermark of the last forwarded post ID.
///
/// Once an ID is recorded for a username, no post with an ID less than or
/// equal to it (string order) is ever forwarded again for that username.
/// The poll loop owns the in-memory map; a [`BookmarkStore`] persists it.
///
/// [`BookmarkStore`]: crate::ports::BookmarkStore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatermarkMap(BTreeMap<String, String>);

impl WatermarkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last forwarded post ID for an account, if any
    pub fn get(&self, username: &str) -> Option<&str> {
        self.0.get(username).map(String::as_str)
    }

    /// Record `id` as the new watermark for `username`.
    ///
    /// Last-write-wins: any prior value is overwritten. Only one forward
    /// pass runs per account per cycle, so no merge is needed.
    pub fn advance(&mut self, username: &str, id: &str) {
        self.0.insert(username.to_string(), id.to_string());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of one poll pass over a single account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSummary {
    /// Account username
    pub account: String,
    /// Posts returned by the fetch adapter
    pub fetched: usize,
    /// Posts newer than the watermark (or the bootstrap post)
    pub selected: usize,
    /// Selected posts dropped by the filter policy or ignore patterns
    pub excluded: usize,
    /// Posts published successfully
    pub forwarded: usize,
    /// Posts whose publish attempt failed (watermark still advanced)
    pub failed: usize,
}

impl AccountSummary {
    pub fn empty(account: &str) -> Self {
        Self {
            account: account.to_string(),
            ..Default::default()
        }
    }
}
