//! Configuration types for profile-dl

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, quality upgrades)
///
/// Groups settings related to how artifacts are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download root directory (default: "./downloads")
    ///
    /// Each entity gets its own subdirectory at `<download_dir>/<service>/<user_id>`,
    /// which also holds that entity's state record.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent in-flight fetches (default: 3, clamped to 1..=20)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Size below which an existing file is considered a low-quality candidate
    /// for replacement by a higher-quality source (default: 500 KiB)
    #[serde(default = "default_upgrade_threshold")]
    pub upgrade_threshold_bytes: u64,

    /// Transport-level timeout applied per request by the bundled HTTP fetcher
    /// (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_secs_serde")]
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            upgrade_threshold_bytes: default_upgrade_threshold(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per locator, including the first (default: 3)
    ///
    /// The same budget is applied in full to the fallback locator if the
    /// primary exhausts it.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between retry attempts (default: 1000 ms)
    #[serde(default = "default_backoff", with = "duration_millis_serde")]
    pub backoff: Duration,

    /// Add random jitter (up to +100%) to retry delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Treat HTTP 403 as transient and retry it (default: true)
    ///
    /// Anti-bot layers commonly answer 403 for requests that succeed on retry.
    /// Disable when 403 reliably means a permanent authorization failure.
    #[serde(default = "default_true")]
    pub retry_forbidden: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            jitter: false,
            retry_forbidden: true,
        }
    }
}

/// Main configuration for [`ProfileDownloader`](crate::downloader::ProfileDownloader)
///
/// Sub-config fields are flattened for backward-compatible serialization, so the
/// JSON/TOML format stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry behavior for transient failures
    #[serde(flatten)]
    pub retry: RetryConfig,
}

// Convenience accessors so call sites don't reach into sub-config structs.
impl Config {
    /// Download root directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Reject settings that would make the engine inert
    ///
    /// Called by [`ProfileDownloader::new`](crate::downloader::ProfileDownloader::new)
    /// before any component is constructed.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("max_attempts".to_string()),
            });
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_upgrade_threshold() -> u64 {
    500 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_millis(1000)
}

fn default_true() -> bool {
    true
}

// Duration serialization helpers (seconds / milliseconds as plain integers)

mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
