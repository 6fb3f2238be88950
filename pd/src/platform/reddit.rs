//! Reddit API client implementation
//!
//! Implements the DiscussionClient trait over Reddit's OAuth2 API using the
//! script-app password grant. Feed polling keeps an internal cursor per
//! stream so only items posted after startup are ever returned.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::client::DiscussionClient;
use super::error::{is_retryable_status, PlatformError};
use super::types::{Comment, CommentRef, Parent, Submission};
use crate::config::{RedditConfig, RedditCredentials};

/// Refresh the access token this long before it actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Items fetched per feed poll
const FEED_LIMIT: u32 = 100;

/// A bearer token with its expiry deadline
struct AuthToken {
    access_token: String,
    expires_at: Instant,
}

impl AuthToken {
    fn is_expired(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN >= self.expires_at
    }
}

/// Reddit API client
pub struct RedditClient {
    base_url: String,
    auth_url: String,
    subreddit: String,
    credentials: RedditCredentials,
    http: Client,
    token: Mutex<Option<AuthToken>>,
    /// Fullname of the newest submission already seen
    submission_cursor: Mutex<Option<String>>,
    /// Fullname of the newest comment already seen
    comment_cursor: Mutex<Option<String>>,
}

impl RedditClient {
    /// Create a new client from configuration and verify credentials
    /// by fetching an initial access token.
    pub async fn connect(config: &RedditConfig, subreddit: &str) -> Result<Self, PlatformError> {
        let credentials = config
            .credentials()
            .map_err(|e| PlatformError::Auth(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(PlatformError::Network)?;

        let client = Self {
            base_url: config.base_url.clone(),
            auth_url: config.auth_url.clone(),
            subreddit: subreddit.to_string(),
            credentials,
            http,
            token: Mutex::new(None),
            submission_cursor: Mutex::new(None),
            comment_cursor: Mutex::new(None),
        };

        client.bearer().await?;
        debug!(subreddit = %client.subreddit, "Reddit client authenticated");
        Ok(client)
    }

    /// Get a valid bearer token, re-authenticating if the cached one expired
    async fn bearer(&self) -> Result<String, PlatformError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!("Reddit access token expired, re-authenticating");
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "password");
        params.insert("username", self.credentials.username.as_str());
        params.insert("password", self.credentials.password.as_str());

        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Auth(format!("token request failed ({}): {}", status, message)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        let access_token = body
            .access_token
            .ok_or_else(|| PlatformError::Auth(body.error.unwrap_or_else(|| "no access token in response".into())))?;

        let token = AuthToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in.unwrap_or(3600)),
        };
        *guard = Some(token);
        Ok(access_token)
    }

    /// Map a non-success status to the error taxonomy
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        if status == 404 {
            return Err(PlatformError::NotFound(response.url().path().to_string()));
        }

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10));
            return Err(PlatformError::RateLimited { retry_after });
        }

        let message = response.text().await.unwrap_or_default();
        if status == 401 {
            return Err(PlatformError::Auth(message));
        }

        if is_retryable_status(status) {
            return Err(PlatformError::Transient(format!("HTTP {}: {}", status, message)));
        }

        Err(PlatformError::Api { status, message })
    }

    async fn get_listing<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Vec<T>, PlatformError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let response = Self::check_response(response).await?;

        let listing: Listing<T> = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        Ok(listing.data.children.into_iter().map(|thing| thing.data).collect())
    }

    async fn post_form(&self, path: &str, params: &HashMap<&str, String>) -> Result<serde_json::Value, PlatformError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = self.http.post(&url).bearer_auth(token).form(params).send().await?;
        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }

    /// Split a freshly fetched newest-first listing at the cursor, returning
    /// the unseen items oldest-first and advancing the cursor. A `None`
    /// cursor means this is the first poll: seed it and report nothing, so
    /// pre-existing history is skipped.
    fn take_unseen<T>(cursor: &mut Option<String>, items: Vec<T>, fullname: impl Fn(&T) -> &str) -> Vec<T> {
        let newest = match items.first() {
            Some(item) => fullname(item).to_string(),
            None => return Vec::new(),
        };

        let unseen = match cursor.as_deref() {
            None => Vec::new(),
            Some(seen) => {
                let mut fresh: Vec<T> = items.into_iter().take_while(|item| fullname(item) != seen).collect();
                fresh.reverse();
                fresh
            }
        };

        *cursor = Some(newest);
        unseen
    }
}

#[async_trait]
impl DiscussionClient for RedditClient {
    async fn poll_new_submissions(&self) -> Result<Vec<Submission>, PlatformError> {
        let path = format!("/r/{}/new.json?limit={}", self.subreddit, FEED_LIMIT);
        let items: Vec<SubmissionData> = self.get_listing(&path).await?;

        let mut cursor = self.submission_cursor.lock().await;
        let fresh = Self::take_unseen(&mut cursor, items, |s| s.name.as_str());
        Ok(fresh.into_iter().map(SubmissionData::into_submission).collect())
    }

    async fn poll_new_comments(&self) -> Result<Vec<Comment>, PlatformError> {
        let path = format!("/r/{}/comments.json?limit={}", self.subreddit, FEED_LIMIT);
        let items: Vec<CommentData> = self.get_listing(&path).await?;

        let mut cursor = self.comment_cursor.lock().await;
        let fresh = Self::take_unseen(&mut cursor, items, |c| c.name.as_str());
        Ok(fresh.into_iter().map(CommentData::into_comment).collect())
    }

    async fn reply_to_submission(&self, submission_id: &str, body: &str) -> Result<CommentRef, PlatformError> {
        self.reply(&format!("t3_{}", submission_id), body).await
    }

    async fn reply_to_comment(&self, comment_id: &str, body: &str) -> Result<CommentRef, PlatformError> {
        self.reply(&format!("t1_{}", comment_id), body).await
    }

    async fn distinguish_comment(&self, comment_id: &str, sticky: bool) -> Result<(), PlatformError> {
        let mut params = HashMap::new();
        params.insert("api_type", "json".to_string());
        params.insert("id", format!("t1_{}", comment_id));
        params.insert("how", "yes".to_string());
        params.insert("sticky", sticky.to_string());

        self.post_form("/api/distinguish", &params).await?;
        Ok(())
    }

    async fn get_comment(&self, comment_id: &str) -> Result<Comment, PlatformError> {
        let path = format!("/api/info.json?id=t1_{}", comment_id);
        let mut items: Vec<CommentData> = self.get_listing(&path).await?;

        match items.pop() {
            Some(data) => Ok(data.into_comment()),
            None => Err(PlatformError::NotFound(format!("comment {}", comment_id))),
        }
    }
}

impl RedditClient {
    async fn reply(&self, thing_id: &str, body: &str) -> Result<CommentRef, PlatformError> {
        let mut params = HashMap::new();
        params.insert("api_type", "json".to_string());
        params.insert("thing_id", thing_id.to_string());
        params.insert("text", body.to_string());

        let response = self.post_form("/api/comment", &params).await?;

        let id = response["json"]["data"]["things"][0]["data"]["id"]
            .as_str()
            .map(|s| strip_kind(s).to_string());

        match id {
            Some(id) => Ok(CommentRef { id }),
            None => {
                warn!(thing_id, "Reply response missing comment id");
                Err(PlatformError::InvalidResponse("reply response missing comment id".into()))
            }
        }
    }
}

/// Strip a `t1_`/`t3_` kind prefix from a fullname, if present
fn strip_kind(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.len() == 2 && kind.starts_with('t') => id,
        _ => fullname,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SubmissionData {
    id: String,
    /// Fullname, e.g. "t3_abc123"
    name: String,
    title: String,
    author: String,
}

impl SubmissionData {
    fn into_submission(self) -> Submission {
        Submission {
            id: self.id,
            title: self.title,
            author: self.author,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    /// Fullname, e.g. "t1_def456"
    name: String,
    body: String,
    /// Stable author identity, e.g. "t2_xyz"; absent for deleted accounts
    author_fullname: Option<String>,
    /// Fullname of the submission this comment belongs to
    link_id: String,
    /// Fullname of the direct parent (submission or comment)
    parent_id: String,
}

impl CommentData {
    fn into_comment(self) -> Comment {
        let parent = if self.parent_id.starts_with("t3_") {
            Parent::Submission(strip_kind(&self.parent_id).to_string())
        } else {
            Parent::Comment(strip_kind(&self.parent_id).to_string())
        };

        Comment {
            id: self.id,
            body: self.body,
            author_id: self.author_fullname.unwrap_or_else(|| "[deleted]".to_string()),
            submission_id: strip_kind(&self.link_id).to_string(),
            parent,
        }
    }
}
