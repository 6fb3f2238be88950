//! playlistd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main playlistd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discussion platform credentials and endpoints
    pub reddit: RedditConfig,

    /// Music platform credentials and endpoints
    pub spotify: SpotifyConfig,

    /// Bot behavior settings
    pub bot: BotConfig,

    /// Task executor settings
    pub executor: ExecutorConfig,

    /// Snapshot and vote ledger storage
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the credential environment variables are set. Call this
    /// early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        for var in [
            &self.reddit.client_id_env,
            &self.reddit.client_secret_env,
            &self.reddit.username_env,
            &self.reddit.password_env,
            &self.spotify.client_id_env,
            &self.spotify.client_secret_env,
            &self.spotify.refresh_token_env,
        ] {
            if std::env::var(var).is_err() {
                return Err(eyre::eyre!("Credential not found. Set the {} environment variable.", var));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .playlistd.yml
        let local_config = PathBuf::from(".playlistd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/playlistd/playlistd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("playlistd").join("playlistd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Resolved credential set for the discussion platform
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

/// Discussion platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    /// Environment variable containing the OAuth client id
    #[serde(rename = "client-id-env")]
    pub client_id_env: String,

    /// Environment variable containing the OAuth client secret
    #[serde(rename = "client-secret-env")]
    pub client_secret_env: String,

    /// Environment variable containing the bot account name
    #[serde(rename = "username-env")]
    pub username_env: String,

    /// Environment variable containing the bot account password
    #[serde(rename = "password-env")]
    pub password_env: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// API base URL (authenticated endpoints)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Token endpoint URL
    #[serde(rename = "auth-url")]
    pub auth_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id_env: "REDDIT_CLIENT_ID".to_string(),
            client_secret_env: "REDDIT_CLIENT_SECRET".to_string(),
            username_env: "REDDIT_USERNAME".to_string(),
            password_env: "REDDIT_PASSWORD".to_string(),
            user_agent: "playlistd (collaborative playlist bot)".to_string(),
            base_url: "https://oauth.reddit.com".to_string(),
            auth_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl RedditConfig {
    /// Resolve credentials from the configured environment variables
    pub fn credentials(&self) -> Result<RedditCredentials> {
        Ok(RedditCredentials {
            client_id: env_var(&self.client_id_env)?,
            client_secret: env_var(&self.client_secret_env)?,
            username: env_var(&self.username_env)?,
            password: env_var(&self.password_env)?,
        })
    }
}

/// Resolved credential set for the music platform
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Music platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// Environment variable containing the OAuth client id
    #[serde(rename = "client-id-env")]
    pub client_id_env: String,

    /// Environment variable containing the OAuth client secret
    #[serde(rename = "client-secret-env")]
    pub client_secret_env: String,

    /// Environment variable containing the user refresh token
    #[serde(rename = "refresh-token-env")]
    pub refresh_token_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Token endpoint URL
    #[serde(rename = "auth-url")]
    pub auth_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id_env: "SPOTIFY_CLIENT_ID".to_string(),
            client_secret_env: "SPOTIFY_CLIENT_SECRET".to_string(),
            refresh_token_env: "SPOTIFY_REFRESH_TOKEN".to_string(),
            base_url: "https://api.spotify.com/v1".to_string(),
            auth_url: "https://accounts.spotify.com/api/token".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl SpotifyConfig {
    /// Resolve credentials from the configured environment variables
    pub fn credentials(&self) -> Result<SpotifyCredentials> {
        Ok(SpotifyCredentials {
            client_id: env_var(&self.client_id_env)?,
            client_secret: env_var(&self.client_secret_env)?,
            refresh_token: env_var(&self.refresh_token_env)?,
        })
    }
}

/// Bot behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Community to watch for playlist requests
    pub subreddit: String,

    /// Vote threshold used when an auto= value fails to parse
    #[serde(rename = "default-threshold")]
    pub default_threshold: u32,

    /// Seconds between feed polls
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Pause after a transient stream error before resuming
    #[serde(rename = "stream-backoff-secs")]
    pub stream_backoff_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            subreddit: "LetsMakeAPlaylist".to_string(),
            default_threshold: 10,
            poll_interval_secs: 5,
            stream_backoff_secs: 10,
        }
    }
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stream_backoff(&self) -> Duration {
        Duration::from_secs(self.stream_backoff_secs)
    }
}

/// Task executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause between retries of a failed task pair
    #[serde(rename = "retry-backoff-secs")]
    pub retry_backoff_secs: u64,

    /// Give up on a task after this many retries; 0 means retry forever
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_backoff_secs: 4,
            max_retries: 0,
        }
    }
}

impl ExecutorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// Retry bound as an Option; `None` means unbounded
    pub fn retry_bound(&self) -> Option<u32> {
        (self.max_retries > 0).then_some(self.max_retries)
    }
}

/// Snapshot and vote ledger storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for snapshot and ledger files
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("playlistd"))
            .unwrap_or_else(|| PathBuf::from(".playlistd"));

        Self { data_dir }
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| eyre::eyre!("Environment variable {} is not set", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.bot.default_threshold, 10);
        assert_eq!(config.bot.poll_interval_secs, 5);
        assert_eq!(config.executor.retry_backoff_secs, 4);
        assert_eq!(config.executor.max_retries, 0);
        assert_eq!(config.reddit.client_id_env, "REDDIT_CLIENT_ID");
        assert_eq!(config.spotify.auth_url, "https://accounts.spotify.com/api/token");
    }

    #[test]
    fn test_retry_bound() {
        let mut executor = ExecutorConfig::default();
        assert_eq!(executor.retry_bound(), None);

        executor.max_retries = 5;
        assert_eq!(executor.retry_bound(), Some(5));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
bot:
  subreddit: MixtapeClub
  default-threshold: 3
  poll-interval-secs: 2

executor:
  retry-backoff-secs: 1
  max-retries: 10

storage:
  data-dir: /tmp/playlistd-test
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.bot.subreddit, "MixtapeClub");
        assert_eq!(config.bot.default_threshold, 3);
        assert_eq!(config.executor.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.executor.retry_bound(), Some(10));
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/playlistd-test"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
bot:
  subreddit: MixtapeClub
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.bot.subreddit, "MixtapeClub");

        // Defaults for unspecified
        assert_eq!(config.bot.default_threshold, 10);
        assert_eq!(config.reddit.user_agent, "playlistd (collaborative playlist bot)");
        assert_eq!(config.executor.retry_backoff_secs, 4);
    }
}
