//! Content filtering policy: which fetched posts are never forwarded

use crate::model::SourcePost;

/// Literal marker for legacy-style retweets
const REPOST_MARKER: &str = "RT @";

/// Hostnames of the source platform, used to detect quote-reposts
const SOURCE_DOMAINS: [&str; 2] = ["https://twitter.com/", "https://x.com/"];

/// A quote-repost with less than this many characters of own text
/// (after URL stripping) is treated as content-free and excluded
const QUOTE_MIN_REMAINDER_CHARS: usize = 10;

/// Why a post was excluded from forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    /// Retweet flag set, or text starts with `RT @`
    Repost,
    /// Trimmed text starts with `@`
    Mention,
    /// Link back to the source platform with a near-empty remainder
    QuoteRepost,
}

impl ExcludeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcludeReason::Repost => "repost",
            ExcludeReason::Mention => "mention",
            ExcludeReason::QuoteRepost => "quote_repost",
        }
    }
}

impl std::fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides which posts are eligible for forwarding.
///
/// Pure and deterministic: evaluating the same post twice yields the same
/// result. Rules are checked cheapest first; the quote-repost rule needs
/// URL stripping and runs last.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterPolicy;

impl FilterPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Returns the reason a post must not be forwarded, or `None` if eligible
    pub fn evaluate(&self, post: &SourcePost) -> Option<ExcludeReason> {
        if post.is_repost || post.text.starts_with(REPOST_MARKER) {
            return Some(ExcludeReason::Repost);
        }

        if post.text.trim().starts_with('@') {
            return Some(ExcludeReason::Mention);
        }

        if SOURCE_DOMAINS.iter().any(|d| post.text.contains(d)) {
            // A quote-repost carries its own commentary only outside the
            // embedded URLs. When no URLs were extracted the full text is
            // the remainder.
            let mut remainder = post.text.clone();
            for url in &post.urls {
                remainder = remainder.replace(url, "");
            }
            if remainder.trim().chars().count() < QUOTE_MIN_REMAINDER_CHARS {
                return Some(ExcludeReason::QuoteRepost);
            }
        }

        None
    }

    pub fn is_excludable(&self, post: &SourcePost) -> bool {
        self.evaluate(post).is_some()
    }
}
