//! Platform error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to either platform
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Transient platform error: {0}")]
    Transient(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlatformError {
    /// Check if this error is transient (watchers pause, executor retries)
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Transient(_) => true,
            PlatformError::RateLimited { .. } => true,
            PlatformError::Network(_) => true,
            PlatformError::Api { status, .. } => is_retryable_status(*status),
            PlatformError::Auth(_) => false,
            PlatformError::NotFound(_) => false,
            PlatformError::InvalidResponse(_) => false,
            PlatformError::Json(_) => false,
        }
    }

    /// Check if this is an authentication failure (fatal at startup)
    pub fn is_auth(&self) -> bool {
        matches!(self, PlatformError::Auth(_))
    }

    /// Get the retry duration if the platform told us one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PlatformError::Transient("socket reset".into()).is_transient());
        assert!(
            PlatformError::RateLimited {
                retry_after: Duration::from_secs(5)
            }
            .is_transient()
        );

        // 5xx retryable, 4xx not
        assert!(
            PlatformError::Api {
                status: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            !PlatformError::Api {
                status: 403,
                message: "forbidden".into()
            }
            .is_transient()
        );

        assert!(!PlatformError::Auth("bad credentials".into()).is_transient());
        assert!(!PlatformError::NotFound("no such track".into()).is_transient());
        assert!(!PlatformError::InvalidResponse("truncated body".into()).is_transient());
    }

    #[test]
    fn test_is_auth() {
        assert!(PlatformError::Auth("expired refresh token".into()).is_auth());
        assert!(!PlatformError::Transient("timeout".into()).is_auth());
    }

    #[test]
    fn test_retry_after() {
        let err = PlatformError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

        let err = PlatformError::Api {
            status: 500,
            message: "server error".into(),
        };
        assert_eq!(err.retry_after(), None);
    }
}
