//! Bluesky publishing adapter (atproto XRPC)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use skybridge_domain::{PostPublisher, PublishError, PublishReceipt};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

/// Bluesky post length limit in characters
const DEFAULT_MAX_CHARS: usize = 300;

/// Bluesky publisher for creating feed posts
pub struct BlueskyPublisher {
    client: Client,
    base_url: String,
    identifier: String,
    password: SecretString,
    max_chars: usize,
    session: RwLock<Option<Session>>,
}

#[derive(Debug, Clone)]
struct Session {
    access_jwt: String,
    did: String,
    handle: String,
}

impl BlueskyPublisher {
    pub fn new(identifier: String, password: SecretString) -> Self {
        Self::with_base_url(
            identifier,
            password,
            "https://bsky.social".to_string(),
            DEFAULT_MAX_CHARS,
        )
    }

    pub fn with_base_url(
        identifier: String,
        password: SecretString,
        base_url: String,
        max_chars: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url,
            identifier,
            password,
            max_chars,
            session: RwLock::new(None),
        }
    }

    /// Authenticate with the service and store the session.
    ///
    /// Called once at startup; a failure here is fatal to the caller.
    /// `publish` re-invokes it when the access token expires.
    pub async fn login(&self) -> Result<(), PublishError> {
        let url = format!("{}/xrpc/com.atproto.server.createSession", self.base_url);

        let request = CreateSessionRequest {
            identifier: &self.identifier,
            password: self.password.expose_secret(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        if response.status() == 401 {
            return Err(PublishError::Auth(
                "Invalid identifier or app password".to_string(),
            ));
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!(
                "Failed to create session: {}",
                body
            )));
        }

        let session: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        tracing::info!(handle = %session.handle, did = %session.did, "Authenticated with Bluesky");

        *self.session.write().await = Some(Session {
            access_jwt: session.access_jwt,
            did: session.did,
            handle: session.handle,
        });

        Ok(())
    }

    async fn current_session(&self) -> Result<Session, PublishError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| PublishError::Auth("Not logged in".to_string()))
    }

    async fn create_record(
        &self,
        session: &Session,
        text: &str,
    ) -> Result<RecordOutcome, PublishError> {
        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.base_url);

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| PublishError::Api(e.to_string()))?;

        let request = CreateRecordRequest {
            repo: &session.did,
            collection: "app.bsky.feed.post",
            record: PostRecord {
                record_type: "app.bsky.feed.post",
                text,
                created_at: &created_at,
            },
        };

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", session.access_jwt),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(PublishError::RateLimited);
        }

        if response.status() == 400 || response.status() == 401 {
            let error: XrpcError = response
                .json()
                .await
                .map_err(|e| PublishError::Api(e.to_string()))?;
            if error.error == "ExpiredToken" {
                return Ok(RecordOutcome::Expired);
            }
            return Err(PublishError::Api(format!(
                "{}: {}",
                error.error, error.message
            )));
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!(
                "Failed to create record: {}",
                body
            )));
        }

        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        Ok(RecordOutcome::Created(created))
    }
}

enum RecordOutcome {
    Created(CreateRecordResponse),
    Expired,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    record: PostRecord<'a>,
}

#[derive(Serialize)]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    record_type: &'a str,
    text: &'a str,
    #[serde(rename = "createdAt")]
    created_at: &'a str,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Deserialize)]
struct XrpcError {
    error: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl PostPublisher for BlueskyPublisher {
    async fn publish(&self, text: &str) -> Result<PublishReceipt, PublishError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let session = self.current_session().await?;

        let created = match self.create_record(&session, text).await? {
            RecordOutcome::Created(created) => created,
            RecordOutcome::Expired => {
                tracing::info!("Access token expired, re-authenticating");
                self.login().await?;
                let session = self.current_session().await?;
                match self.create_record(&session, text).await? {
                    RecordOutcome::Created(created) => created,
                    RecordOutcome::Expired => {
                        return Err(PublishError::Auth(
                            "Session expired immediately after login".to_string(),
                        ));
                    }
                }
            }
        };

        // at://did:plc:.../app.bsky.feed.post/<rkey>
        let url = created
            .uri
            .rsplit('/')
            .next()
            .map(|rkey| format!("https://bsky.app/profile/{}/post/{}", session.handle, rkey));

        Ok(PublishReceipt {
            id: created.uri,
            url,
        })
    }
}
