//! Poll loop use case - orchestrates fetching, filtering, and forwarding

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::sleep;

use crate::{
    model::{AccountSummary, MonitoredAccount, SourcePost, WatermarkMap},
    policy::FilterPolicy,
    ports::{BookmarkStore, PostPublisher, PostSource},
};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Accounts to watch, processed in this order
    pub accounts: Vec<MonitoredAccount>,
    /// Maximum posts fetched per account per cycle
    pub max_posts_per_check: usize,
    /// Regex patterns for posts to ignore (in addition to the filter policy)
    pub ignore_patterns: Vec<String>,
    /// Delay between accounts within a cycle
    pub pacing_delay: Duration,
    /// Log instead of publishing; watermarks are never persisted
    pub dry_run: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            accounts: vec![],
            max_posts_per_check: 10,
            ignore_patterns: vec![],
            pacing_delay: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

/// Poll loop orchestrator.
///
/// Owns the in-memory watermark map exclusively. Accounts are processed one
/// at a time, each fully (fetch, filter, publish, advance, persist) before
/// the next begins.
pub struct PollLoop<S, P, B>
where
    S: PostSource + ?Sized,
    P: PostPublisher + ?Sized,
    B: BookmarkStore + ?Sized,
{
    source: Arc<S>,
    publisher: Arc<P>,
    store: Arc<B>,
    config: PollConfig,
    policy: FilterPolicy,
    ignore_patterns: Vec<Regex>,
    watermarks: WatermarkMap,
}

impl<S, P, B> PollLoop<S, P, B>
where
    S: PostSource + ?Sized,
    P: PostPublisher + ?Sized,
    B: BookmarkStore + ?Sized,
{
    /// Create the loop, loading persisted watermarks from the store
    pub async fn load(
        source: Arc<S>,
        publisher: Arc<P>,
        store: Arc<B>,
        config: PollConfig,
    ) -> Self {
        let watermarks = store.load().await;

        tracing::info!(
            accounts = config.accounts.len(),
            known_watermarks = watermarks.len(),
            "Loaded watermarks"
        );

        let ignore_patterns = compile_ignore_patterns(&config.ignore_patterns);

        Self {
            source,
            publisher,
            store,
            config,
            policy: FilterPolicy::new(),
            ignore_patterns,
            watermarks,
        }
    }

    /// Current in-memory watermark for an account
    pub fn watermark(&self, username: &str) -> Option<&str> {
        self.watermarks.get(username)
    }

    /// Run a single cycle over all configured accounts.
    ///
    /// Per-account failures are logged and yield a zero-count summary; they
    /// never abort the cycle or affect other accounts.
    pub async fn poll_once(&mut self) -> Vec<AccountSummary> {
        let accounts = self.config.accounts.clone();
        let mut summaries = Vec::with_capacity(accounts.len());

        for (i, account) in accounts.iter().enumerate() {
            if i > 0 && !self.config.pacing_delay.is_zero() {
                sleep(self.config.pacing_delay).await;
            }
            summaries.push(self.poll_account(&account.username).await);
        }

        summaries
    }

    /// Process a single account: fetch, select, filter, publish, advance, persist
    async fn poll_account(&mut self, account: &str) -> AccountSummary {
        let mut summary = AccountSummary::empty(account);

        tracing::info!(
            account = %account,
            watermark = ?self.watermarks.get(account),
            "Checking account"
        );

        let fetched = match self
            .source
            .fetch_recent(account, self.config.max_posts_per_check)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                tracing::error!(account = %account, error = %e, "Failed to fetch posts");
                return summary;
            }
        };

        summary.fetched = fetched.len();
        if fetched.is_empty() {
            tracing::debug!(account = %account, "No posts fetched");
            return summary;
        }

        let selected = select_new(fetched, self.watermarks.get(account));
        summary.selected = selected.len();
        if selected.is_empty() {
            tracing::debug!(account = %account, "No posts newer than watermark");
            return summary;
        }

        let mut eligible = Vec::new();
        for post in selected {
            if let Some(reason) = self.policy.evaluate(&post) {
                tracing::debug!(
                    account = %account,
                    post_id = %post.id,
                    reason = %reason,
                    "Excluded post"
                );
                summary.excluded += 1;
                continue;
            }
            if self
                .ignore_patterns
                .iter()
                .any(|pattern| pattern.is_match(&post.text))
            {
                tracing::debug!(account = %account, post_id = %post.id, "Ignore pattern matched");
                summary.excluded += 1;
                continue;
            }
            eligible.push(post);
        }

        if summary.excluded > 0 {
            tracing::info!(
                account = %account,
                excluded = summary.excluded,
                "Excluded mention/repost posts"
            );
        }

        if eligible.is_empty() {
            tracing::debug!(account = %account, "No eligible posts to forward");
            return summary;
        }

        let mut advanced = false;
        for post in &eligible {
            self.forward_post(account, post, &mut summary).await;
            // At-most-once semantics: the watermark advances whether or not
            // the publish succeeded, so a failing post is never retried.
            self.watermarks.advance(account, &post.id);
            advanced = true;
        }

        if advanced && !self.config.dry_run {
            if let Err(e) = self.store.save(&self.watermarks).await {
                tracing::error!(account = %account, error = %e, "Failed to persist watermarks");
            }
        }

        summary
    }

    async fn forward_post(&self, account: &str, post: &SourcePost, summary: &mut AccountSummary) {
        if self.config.dry_run {
            tracing::info!(
                account = %account,
                post_id = %post.id,
                text = %post.text,
                "[DRY RUN] Would forward"
            );
            summary.forwarded += 1;
            return;
        }

        match self.publisher.publish(&post.text).await {
            Ok(receipt) => {
                tracing::info!(
                    account = %account,
                    post_id = %post.id,
                    published_id = %receipt.id,
                    published_url = ?receipt.url,
                    created_at = %post.created_at,
                    "Forwarded post"
                );
                summary.forwarded += 1;
            }
            Err(e) => {
                tracing::error!(
                    account = %account,
                    post_id = %post.id,
                    error = %e,
                    "Failed to publish post"
                );
                summary.failed += 1;
            }
        }
    }
}

/// Select the posts to process for an account, in ascending ID order.
///
/// Without a watermark only the single most recent post is selected, so the
/// first run bootstraps the watermark without a backlog flood. With a
/// watermark, every post strictly newer than it is selected.
fn select_new(posts: Vec<SourcePost>, watermark: Option<&str>) -> Vec<SourcePost> {
    match watermark {
        Some(w) => {
            let mut newer: Vec<SourcePost> =
                posts.into_iter().filter(|p| p.id.as_str() > w).collect();
            newer.sort_by(|a, b| a.id.cmp(&b.id));
            newer
        }
        None => posts
            .into_iter()
            .max_by(|a, b| a.id.cmp(&b.id))
            .into_iter()
            .collect(),
    }
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(error) => {
                tracing::warn!(pattern = %pattern, error = %error, "Invalid ignore pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BookmarkError, PostSourceError, PublishError, PublishReceipt};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    fn post(id: &str, text: &str) -> SourcePost {
        SourcePost {
            id: id.to_string(),
            text: text.to_string(),
            author: "alice".to_string(),
            url: format!("https://x.com/alice/status/{id}"),
            created_at: OffsetDateTime::UNIX_EPOCH,
            is_repost: false,
            urls: vec![],
        }
    }

    fn accounts(names: &[&str]) -> Vec<MonitoredAccount> {
        names.iter().map(|n| MonitoredAccount::new(*n)).collect()
    }

    fn config(names: &[&str]) -> PollConfig {
        PollConfig {
            accounts: accounts(names),
            pacing_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    struct FakeSource {
        posts: Vec<SourcePost>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_posts(posts: Vec<SourcePost>) -> Self {
            Self {
                posts,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                posts: vec![],
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostSource for FakeSource {
        async fn fetch_recent(
            &self,
            _account: &str,
            _limit: usize,
        ) -> Result<Vec<SourcePost>, PostSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PostSourceError::Api("boom".to_string()));
            }
            Ok(self.posts.clone())
        }
    }

    struct FakePublisher {
        published: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl FakePublisher {
        fn new() -> Self {
            Self {
                published: Mutex::new(vec![]),
                fail_on: None,
            }
        }

        fn failing_on(marker: &str) -> Self {
            Self {
                published: Mutex::new(vec![]),
                fail_on: Some(marker.to_string()),
            }
        }

        fn published(&self) -> Vec<String> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PostPublisher for FakePublisher {
        async fn publish(&self, text: &str) -> Result<PublishReceipt, PublishError> {
            if let Some(marker) = &self.fail_on {
                if text.contains(marker.as_str()) {
                    return Err(PublishError::Api("rejected".to_string()));
                }
            }
            self.published.lock().unwrap().push(text.to_string());
            Ok(PublishReceipt {
                id: "at://fake".to_string(),
                url: None,
            })
        }
    }

    struct FakeStore {
        saved: Mutex<Option<WatermarkMap>>,
        initial: WatermarkMap,
        save_count: AtomicUsize,
    }

    impl FakeStore {
        fn empty() -> Self {
            Self {
                saved: Mutex::new(None),
                initial: WatermarkMap::new(),
                save_count: AtomicUsize::new(0),
            }
        }

        fn with_watermark(username: &str, id: &str) -> Self {
            let mut initial = WatermarkMap::new();
            initial.advance(username, id);
            Self {
                saved: Mutex::new(None),
                initial,
                save_count: AtomicUsize::new(0),
            }
        }

        fn saved(&self) -> Option<WatermarkMap> {
            self.saved.lock().unwrap().clone()
        }

        fn save_count(&self) -> usize {
            self.save_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BookmarkStore for FakeStore {
        async fn load(&self) -> WatermarkMap {
            self.initial.clone()
        }

        async fn save(&self, watermarks: &WatermarkMap) -> Result<(), BookmarkError> {
            self.save_count.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock().unwrap() = Some(watermarks.clone());
            Ok(())
        }
    }

    async fn build_loop(
        source: Arc<FakeSource>,
        publisher: Arc<FakePublisher>,
        store: Arc<FakeStore>,
        config: PollConfig,
    ) -> PollLoop<FakeSource, FakePublisher, FakeStore> {
        PollLoop::load(source, publisher, store, config).await
    }

    #[tokio::test]
    async fn bootstrap_selects_only_most_recent() {
        let source = Arc::new(FakeSource::with_posts(vec![
            post("7", "newest"),
            post("6", "middle"),
            post("5", "oldest"),
        ]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::empty());

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].selected, 1);
        assert_eq!(publisher.published(), vec!["newest".to_string()]);
        assert_eq!(poll_loop.watermark("alice"), Some("7"));
    }

    #[tokio::test]
    async fn selects_posts_above_watermark_in_ascending_order() {
        let source = Arc::new(FakeSource::with_posts(vec![
            post("7", "seven"),
            post("6", "six"),
            post("5", "five"),
            post("4", "four"),
        ]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].selected, 2);
        assert_eq!(summaries[0].forwarded, 2);
        assert_eq!(
            publisher.published(),
            vec!["six".to_string(), "seven".to_string()]
        );
        assert_eq!(poll_loop.watermark("alice"), Some("7"));
    }

    #[tokio::test]
    async fn publish_failure_still_advances_watermark() {
        let source = Arc::new(FakeSource::with_posts(vec![
            post("7", "seven"),
            post("6", "six"),
        ]));
        let publisher = Arc::new(FakePublisher::failing_on("six"));
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].forwarded, 1);
        assert_eq!(summaries[0].failed, 1);
        assert_eq!(publisher.published(), vec!["seven".to_string()]);

        // Both posts were attempted; the persisted watermark is the last one
        let saved = store.saved().expect("watermarks saved");
        assert_eq!(saved.get("alice"), Some("7"));
    }

    #[tokio::test]
    async fn excluded_posts_are_dropped_and_counted() {
        let source = Arc::new(FakeSource::with_posts(vec![
            post("8", "fresh words"),
            post("7", "RT @bob: recycled"),
            post("6", "@bob replying"),
        ]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].selected, 3);
        assert_eq!(summaries[0].excluded, 2);
        assert_eq!(summaries[0].forwarded, 1);
        assert_eq!(publisher.published(), vec!["fresh words".to_string()]);
        assert_eq!(poll_loop.watermark("alice"), Some("8"));
    }

    #[tokio::test]
    async fn excluded_only_batch_does_not_advance_or_save() {
        let source = Arc::new(FakeSource::with_posts(vec![post("6", "RT @bob: recycled")]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].excluded, 1);
        assert!(publisher.published().is_empty());
        assert_eq!(store.save_count(), 0);
        assert_eq!(poll_loop.watermark("alice"), Some("5"));
    }

    #[tokio::test]
    async fn fetch_error_does_not_affect_other_accounts() {
        // First call fails, second succeeds: use one failing source per
        // account by pointing both accounts at a source that errors once
        struct FlakySource {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl PostSource for FlakySource {
            async fn fetch_recent(
                &self,
                account: &str,
                _limit: usize,
            ) -> Result<Vec<SourcePost>, PostSourceError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if account == "alice" {
                    return Err(PostSourceError::Network("timeout".to_string()));
                }
                Ok(vec![post("3", "from bob")])
            }
        }

        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::empty());

        let mut poll_loop =
            PollLoop::load(
                Arc::clone(&source),
                Arc::clone(&publisher),
                Arc::clone(&store),
                config(&["alice", "bob"]),
            )
            .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].fetched, 0);
        assert_eq!(summaries[1].forwarded, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.published(), vec!["from bob".to_string()]);
    }

    #[tokio::test]
    async fn zero_accounts_performs_no_calls() {
        let source = Arc::new(FakeSource::with_posts(vec![post("1", "unseen")]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::empty());

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&[]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert!(summaries.is_empty());
        assert_eq!(source.calls(), 0);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn source_error_leaves_watermark_untouched() {
        let source = Arc::new(FakeSource::failing());
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            config(&["alice"]),
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0], AccountSummary::empty("alice"));
        assert_eq!(store.save_count(), 0);
        assert_eq!(poll_loop.watermark("alice"), Some("5"));
    }

    #[tokio::test]
    async fn ignore_pattern_drops_post() {
        let source = Arc::new(FakeSource::with_posts(vec![post("6", "AD: buy now")]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut cfg = config(&["alice"]);
        cfg.ignore_patterns = vec!["^AD:".to_string()];

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            cfg,
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].excluded, 1);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_publish_and_persist() {
        let source = Arc::new(FakeSource::with_posts(vec![post("6", "would forward")]));
        let publisher = Arc::new(FakePublisher::new());
        let store = Arc::new(FakeStore::with_watermark("alice", "5"));

        let mut cfg = config(&["alice"]);
        cfg.dry_run = true;

        let mut poll_loop = build_loop(
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&store),
            cfg,
        )
        .await;

        let summaries = poll_loop.poll_once().await;

        assert_eq!(summaries[0].forwarded, 1);
        assert!(publisher.published().is_empty());
        assert_eq!(store.save_count(), 0);
        // The in-memory watermark still moves so a long dry run stays quiet
        assert_eq!(poll_loop.watermark("alice"), Some("6"));
    }

    #[test]
    fn select_new_with_watermark_is_strictly_greater() {
        let posts = vec![post("4", "a"), post("5", "b"), post("6", "c"), post("7", "d")];
        let selected = select_new(posts, Some("5"));
        let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["6", "7"]);
    }

    #[test]
    fn select_new_without_watermark_takes_newest() {
        let posts = vec![post("7", "a"), post("6", "b"), post("5", "c")];
        let selected = select_new(posts, None);
        let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["7"]);
    }

    #[test]
    fn select_new_empty_fetch_selects_nothing() {
        assert!(select_new(vec![], None).is_empty());
        assert!(select_new(vec![], Some("5")).is_empty());
    }
}
