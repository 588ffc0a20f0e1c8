//! Error types for profile-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`FetchError`]: typed transport/provider failures carrying an HTTP-status-like
//!   code, classified as transient, permanent, or fatal
//! - [`Error`]: the top-level error type covering terminal fetch failures, state
//!   store misuse, persistence failures, and I/O

use thiserror::Error;

/// Result type alias for profile-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile-dl
///
/// Item-level corruption is never surfaced through this type; it is reported only
/// through [`VerificationReport`](crate::verify::VerificationReport).
#[derive(Debug, Error)]
pub enum Error {
    /// A fetch failed terminally after exhausting its retry budget (and fallback, if any)
    #[error("fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        /// The final classified fetch failure
        source: FetchError,
        /// Total attempts made before giving up
        attempts: u32,
    },

    /// A state mutation was requested for an entity that was never initialized
    ///
    /// This is a programmer error: callers must `initialize` before
    /// `update_progress` or `mark_completed`.
    #[error("state not initialized for entity {key}")]
    StateNotInitialized {
        /// The entity key (`<service>:<user_id>`) that has no record
        key: String,
    },

    /// Failed to durably write an entity's state record
    #[error("failed to persist state for entity {key}: {reason}")]
    Persistence {
        /// The entity key whose record could not be written
        key: String,
        /// The underlying I/O failure
        reason: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classified fetch failure
///
/// Every failure a [`Fetcher`](crate::fetcher::Fetcher) can produce maps onto one
/// variant. The classification drives the retrieval policy:
///
/// - **transient** (retried with backoff): [`Server`](FetchError::Server),
///   [`RateLimited`](FetchError::RateLimited), [`Forbidden`](FetchError::Forbidden),
///   [`Timeout`](FetchError::Timeout), [`Connection`](FetchError::Connection)
/// - **permanent** (abort immediately): [`NotFound`](FetchError::NotFound),
///   [`Client`](FetchError::Client)
/// - **fatal** (surfaced immediately, consumes no retry budget):
///   [`QuotaExceeded`](FetchError::QuotaExceeded),
///   [`InvalidCredentials`](FetchError::InvalidCredentials)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Server-side error (HTTP 5xx)
    #[error("server error (HTTP {status})")]
    Server {
        /// The HTTP status code returned
        status: u16,
    },

    /// Rate limited by the provider (HTTP 429)
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// Anti-bot or authorization rejection (HTTP 403)
    ///
    /// Anti-bot layers commonly return 403 for requests that succeed on retry,
    /// so this is treated as transient by default. See
    /// [`RetryConfig::retry_forbidden`](crate::config::RetryConfig::retry_forbidden).
    #[error("forbidden (HTTP 403)")]
    Forbidden,

    /// Resource does not exist (HTTP 404)
    #[error("not found (HTTP 404)")]
    NotFound,

    /// Other client-side error (HTTP 4xx)
    #[error("client error (HTTP {status})")]
    Client {
        /// The HTTP status code returned
        status: u16,
    },

    /// Transport-level timeout
    #[error("request timed out")]
    Timeout,

    /// Transport-level connection failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// Provider download quota exhausted (HTTP 402 or provider-specific)
    #[error("provider quota exceeded")]
    QuotaExceeded,

    /// Authentication rejected (HTTP 401)
    #[error("invalid credentials")]
    InvalidCredentials,
}

impl FetchError {
    /// Map an HTTP status code to a classified fetch error
    ///
    /// Statuses below 400 are not failures and map to a generic client error;
    /// callers should only invoke this for error responses.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FetchError::RateLimited,
            403 => FetchError::Forbidden,
            404 => FetchError::NotFound,
            401 => FetchError::InvalidCredentials,
            402 => FetchError::QuotaExceeded,
            500..=599 => FetchError::Server { status },
            _ => FetchError::Client { status },
        }
    }

    /// Returns true for provider-level failures that must be surfaced immediately
    /// without consuming any retry budget
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::QuotaExceeded | FetchError::InvalidCredentials
        )
    }

    /// Short classification label used in log events
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::Server { .. } => "server_error",
            FetchError::RateLimited => "rate_limited",
            FetchError::Forbidden => "forbidden",
            FetchError::NotFound => "not_found",
            FetchError::Client { .. } => "client_error",
            FetchError::Timeout => "timeout",
            FetchError::Connection(_) => "connection",
            FetchError::QuotaExceeded => "quota_exceeded",
            FetchError::InvalidCredentials => "invalid_credentials",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16())
        } else {
            FetchError::Connection(e.to_string())
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Status code mapping
    // -----------------------------------------------------------------------

    #[test]
    fn status_429_maps_to_rate_limited() {
        assert_eq!(FetchError::from_status(429), FetchError::RateLimited);
    }

    #[test]
    fn status_403_maps_to_forbidden() {
        assert_eq!(FetchError::from_status(403), FetchError::Forbidden);
    }

    #[test]
    fn status_404_maps_to_not_found() {
        assert_eq!(FetchError::from_status(404), FetchError::NotFound);
    }

    #[test]
    fn status_401_maps_to_invalid_credentials() {
        assert_eq!(FetchError::from_status(401), FetchError::InvalidCredentials);
    }

    #[test]
    fn status_402_maps_to_quota_exceeded() {
        assert_eq!(FetchError::from_status(402), FetchError::QuotaExceeded);
    }

    #[test]
    fn every_5xx_maps_to_server_error() {
        for status in [500, 502, 503, 504, 599] {
            assert_eq!(
                FetchError::from_status(status),
                FetchError::Server { status },
                "status {status} should classify as a server error"
            );
        }
    }

    #[test]
    fn other_4xx_maps_to_client_error() {
        for status in [400, 410, 422, 451] {
            assert_eq!(
                FetchError::from_status(status),
                FetchError::Client { status },
                "status {status} should classify as a generic client error"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Fatal classification
    // -----------------------------------------------------------------------

    #[test]
    fn quota_and_credentials_are_fatal() {
        assert!(FetchError::QuotaExceeded.is_fatal());
        assert!(FetchError::InvalidCredentials.is_fatal());
    }

    #[test]
    fn transient_and_permanent_errors_are_not_fatal() {
        assert!(!FetchError::Server { status: 500 }.is_fatal());
        assert!(!FetchError::RateLimited.is_fatal());
        assert!(!FetchError::Forbidden.is_fatal());
        assert!(!FetchError::NotFound.is_fatal());
        assert!(!FetchError::Timeout.is_fatal());
        assert!(!FetchError::Connection("reset".into()).is_fatal());
    }

    // -----------------------------------------------------------------------
    // Display and class labels
    // -----------------------------------------------------------------------

    #[test]
    fn fetch_error_display_includes_status() {
        let err = FetchError::Server { status: 503 };
        assert!(err.to_string().contains("503"));
        assert_eq!(err.class(), "server_error");
    }

    #[test]
    fn terminal_fetch_error_display_includes_attempts() {
        let err = Error::Fetch {
            source: FetchError::NotFound,
            attempts: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("1 attempt"), "message was: {msg}");
        assert!(msg.contains("not found"), "message was: {msg}");
    }

    #[test]
    fn state_not_initialized_display_includes_key() {
        let err = Error::StateNotInitialized {
            key: "fanbox:12345".into(),
        };
        assert!(err.to_string().contains("fanbox:12345"));
    }
}
