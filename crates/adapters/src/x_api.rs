//! X API read adapter for fetching account timelines

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use skybridge_domain::{PostSource, PostSourceError, SourcePost};
use std::time::Duration;
use time::OffsetDateTime;

/// X API post source for reading user timelines
pub struct XPostSource {
    client: Client,
    bearer_token: SecretString,
    base_url: String,
}

impl XPostSource {
    pub fn new(bearer_token: SecretString) -> Self {
        Self::with_base_url(bearer_token, "https://api.twitter.com".to_string())
    }

    pub fn with_base_url(bearer_token: SecretString, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            bearer_token,
            base_url,
        }
    }

    /// Look up user ID by username
    async fn get_user_id(&self, username: &str) -> Result<String, PostSourceError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, username);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.bearer_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| PostSourceError::Network(e.to_string()))?;

        if response.status() == 401 {
            return Err(PostSourceError::Auth("Invalid bearer token".to_string()));
        }

        if response.status() == 429 {
            return Err(PostSourceError::RateLimited(rate_limit_reset(&response)));
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PostSourceError::Api(format!(
                "Failed to get user: {}",
                body
            )));
        }

        let user_response: UserResponse = response
            .json()
            .await
            .map_err(|e| PostSourceError::Api(e.to_string()))?;

        Ok(user_response.data.id)
    }

    /// Fetch the most recent tweets for a user
    async fn fetch_user_tweets(
        &self,
        user_id: &str,
        username: &str,
        limit: usize,
    ) -> Result<Vec<SourcePost>, PostSourceError> {
        // The API only accepts max_results within 5..=100
        let max_results = limit.clamp(5, 100);
        let url = format!(
            "{}/2/users/{}/tweets?tweet.fields=created_at,referenced_tweets,entities&max_results={}",
            self.base_url, user_id, max_results
        );

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.bearer_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| PostSourceError::Network(e.to_string()))?;

        if response.status() == 401 {
            return Err(PostSourceError::Auth("Invalid bearer token".to_string()));
        }

        if response.status() == 429 {
            return Err(PostSourceError::RateLimited(rate_limit_reset(&response)));
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PostSourceError::Api(format!(
                "Failed to get tweets: {}",
                body
            )));
        }

        let tweets_response: TweetsResponse = response
            .json()
            .await
            .map_err(|e| PostSourceError::Api(e.to_string()))?;

        let posts = tweets_response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|tweet| {
                let is_repost = tweet
                    .referenced_tweets
                    .as_ref()
                    .map(|refs| refs.iter().any(|r| r.r#type == "retweeted"))
                    .unwrap_or(false);

                let urls = tweet
                    .entities
                    .as_ref()
                    .and_then(|e| e.urls.as_ref())
                    .map(|urls| urls.iter().map(|u| u.url.clone()).collect())
                    .unwrap_or_default();

                let created_at = tweet
                    .created_at
                    .as_ref()
                    .and_then(|s| {
                        OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
                            .ok()
                    })
                    .unwrap_or_else(OffsetDateTime::now_utc);

                SourcePost {
                    id: tweet.id.clone(),
                    text: tweet.text,
                    author: username.to_string(),
                    url: format!("https://x.com/{}/status/{}", username, tweet.id),
                    created_at,
                    is_repost,
                    urls,
                }
            })
            .collect();

        Ok(posts)
    }
}

fn rate_limit_reset(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|ts| {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            Duration::from_secs(ts.saturating_sub(now))
        })
}

#[derive(Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
}

#[derive(Deserialize)]
struct TweetsResponse {
    data: Option<Vec<Tweet>>,
}

#[derive(Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<String>,
    referenced_tweets: Option<Vec<ReferencedTweet>>,
    entities: Option<TweetEntities>,
}

#[derive(Deserialize)]
struct ReferencedTweet {
    r#type: String,
}

#[derive(Deserialize)]
struct TweetEntities {
    urls: Option<Vec<UrlEntity>>,
}

#[derive(Deserialize)]
struct UrlEntity {
    url: String,
}

#[async_trait]
impl PostSource for XPostSource {
    async fn fetch_recent(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<SourcePost>, PostSourceError> {
        tracing::debug!(account = %account, limit = limit, "Fetching posts from X");

        let user_id = self.get_user_id(account).await?;
        let posts = self.fetch_user_tweets(&user_id, account, limit).await?;

        tracing::info!(account = %account, count = posts.len(), "Fetched posts");

        Ok(posts)
    }
}
