//! Spotify Web API client implementation
//!
//! Implements the MusicClient trait. Authentication happens once in
//! [`SpotifyClient::connect`] using the refresh-token grant; a failure there
//! is fatal and aborts daemon startup before any watcher runs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::MusicClient;
use super::error::{is_retryable_status, PlatformError};
use super::types::{Playlist, TrackRef};
use crate::config::{SpotifyConfig, SpotifyCredentials};

/// Refresh the access token this long before it actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct AuthToken {
    access_token: String,
    expires_at: Instant,
}

impl AuthToken {
    fn is_expired(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN >= self.expires_at
    }
}

/// Spotify Web API client
pub struct SpotifyClient {
    base_url: String,
    auth_url: String,
    credentials: SpotifyCredentials,
    http: Client,
    token: Mutex<Option<AuthToken>>,
    /// Id of the account the refresh token belongs to
    user_id: String,
}

impl SpotifyClient {
    /// Create a new client from configuration, authenticate, and resolve
    /// the bot account id.
    pub async fn connect(config: &SpotifyConfig) -> Result<Self, PlatformError> {
        let credentials = config
            .credentials()
            .map_err(|e| PlatformError::Auth(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(PlatformError::Network)?;

        let mut client = Self {
            base_url: config.base_url.clone(),
            auth_url: config.auth_url.clone(),
            credentials,
            http,
            token: Mutex::new(None),
            user_id: String::new(),
        };

        client.bearer().await?;

        let me: UserData = client.get("/me", &[]).await?;
        client.user_id = me.id;
        debug!(user_id = %client.user_id, "Spotify client authenticated");

        Ok(client)
    }

    /// Get a valid bearer token, exchanging the refresh token if needed
    async fn bearer(&self) -> Result<String, PlatformError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!("Spotify access token expired, refreshing");
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", self.credentials.refresh_token.as_str());

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

        let token = AuthToken {
            access_token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in.unwrap_or(3600)),
        };
        let access_token = body.access_token;
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

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, PlatformError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = self.http.get(&url).bearer_auth(token).query(query).send().await?;
        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, PlatformError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl MusicClient for SpotifyClient {
    async fn search_track(&self, artist: &str, title: &str) -> Result<Option<TrackRef>, PlatformError> {
        let query = format!("artist:{} track:{}", artist, title);
        let result: SearchResponse = self
            .get("/search", &[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .await?;

        Ok(result.tracks.items.into_iter().next().map(TrackData::into_track))
    }

    async fn create_playlist(&self, name: &str, public: bool) -> Result<Playlist, PlatformError> {
        let body = serde_json::json!({ "name": name, "public": public });
        let path = format!("/users/{}/playlists", self.user_id);

        let response = self.send_json(reqwest::Method::POST, &path, &body).await?;
        let data: PlaylistData = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        Ok(data.into_playlist())
    }

    async fn set_playlist_collaborative(&self, playlist_id: &str, collaborative: bool) -> Result<(), PlatformError> {
        // The platform rejects collaborative playlists that are also public
        let body = serde_json::json!({ "collaborative": collaborative, "public": !collaborative });
        let path = format!("/playlists/{}", playlist_id);

        self.send_json(reqwest::Method::PUT, &path, &body).await?;
        Ok(())
    }

    async fn add_track(&self, playlist_id: &str, track_uri: &str) -> Result<(), PlatformError> {
        let body = serde_json::json!({ "uris": [track_uri] });
        let path = format!("/playlists/{}/tracks", playlist_id);

        self.send_json(reqwest::Method::POST, &path, &body).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackData>,
}

#[derive(Debug, Deserialize)]
struct TrackData {
    uri: String,
    name: String,
    artists: Vec<ArtistData>,
}

#[derive(Debug, Deserialize)]
struct ArtistData {
    name: String,
}

impl TrackData {
    fn into_track(self) -> TrackRef {
        let artist = self.artists.into_iter().next().map(|a| a.name).unwrap_or_default();
        TrackRef {
            uri: self.uri,
            name: self.name,
            artist,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistData {
    id: String,
    name: String,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl PlaylistData {
    fn into_playlist(self) -> Playlist {
        let url = self
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", self.id));
        Playlist {
            id: self.id,
            name: self.name,
            url,
        }
    }
}
