//! Retrieval policy: retry, backoff, and fallback for one fetch
//!
//! Wraps an injected [`Fetcher`] with the per-item decision logic:
//!
//! - transient failures (5xx, 429, 403, timeouts, connection errors) are retried
//!   with a fixed backoff, up to the attempt budget
//! - permanent failures (404 and other 4xx) abort immediately
//! - fatal provider failures (quota exhausted, invalid credentials) are surfaced
//!   immediately and consume no retry budget
//! - after the primary locator exhausts its budget, a distinct fallback locator
//!   gets the full budget before the fetch is declared terminally failed
//!
//! Also implements the quality-upgrade refinement: an existing small file is
//! replaced atomically when a distinct higher-quality source yields strictly
//! more bytes, and kept otherwise. A failed upgrade never fails the operation.

use crate::config::RetryConfig;
use crate::error::{Error, FetchError, Result};
use crate::fetcher::Fetcher;
use crate::types::DownloadItem;
use bytes::Bytes;
use rand::Rng;
use std::path::Path;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (server busy, rate limits, timeouts) should return `true`.
/// Permanent failures (not found, bad request) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Server { .. }
            | FetchError::RateLimited
            | FetchError::Forbidden
            | FetchError::Timeout
            | FetchError::Connection(_) => true,
            FetchError::NotFound
            | FetchError::Client { .. }
            | FetchError::QuotaExceeded
            | FetchError::InvalidCredentials => false,
        }
    }
}

/// Classification of one failure under a given config
fn should_retry(error: &FetchError, config: &RetryConfig) -> bool {
    match error {
        FetchError::Forbidden => config.retry_forbidden,
        other => other.is_retryable(),
    }
}

/// Fetch one locator with the full retry budget
///
/// On failure, returns the final error together with the number of attempts
/// actually made (fatal errors short-circuit without consuming the budget).
async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    config: &RetryConfig,
) -> std::result::Result<Bytes, (FetchError, u32)> {
    let budget = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match fetcher.fetch(url).await {
            Ok(bytes) => {
                if attempt > 1 {
                    tracing::info!(url, attempts = attempt, "Fetch succeeded after retry");
                }
                return Ok(bytes);
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(url, class = e.class(), error = %e, "Fatal provider error, aborting");
                return Err((e, attempt));
            }
            Err(e) if should_retry(&e, config) && attempt < budget => {
                let delay = if config.jitter {
                    add_jitter(config.backoff)
                } else {
                    config.backoff
                };
                tracing::warn!(
                    url,
                    attempt,
                    max_attempts = budget,
                    class = e.class(),
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Fetch attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if should_retry(&e, config) {
                    tracing::error!(url, attempts = attempt, class = e.class(), error = %e, "Retry budget exhausted");
                } else {
                    tracing::warn!(url, class = e.class(), error = %e, "Permanent fetch failure, not retrying");
                }
                return Err((e, attempt));
            }
        }
    }
}

/// Fetch with the full budget on the primary locator, then on a distinct
/// fallback locator, before declaring terminal failure
pub async fn fetch_with_fallback(
    fetcher: &dyn Fetcher,
    primary: &str,
    fallback: Option<&str>,
    config: &RetryConfig,
) -> Result<Bytes> {
    let (primary_err, primary_attempts) = match fetch_with_retry(fetcher, primary, config).await {
        Ok(bytes) => return Ok(bytes),
        Err(failure) => failure,
    };

    // Fatal errors also skip the fallback; the provider will reject it just the same
    let fallback = fallback.filter(|f| *f != primary && !primary_err.is_fatal());
    let Some(fallback) = fallback else {
        return Err(Error::Fetch {
            source: primary_err,
            attempts: primary_attempts,
        });
    };

    tracing::info!(primary, fallback, "Primary locator exhausted, trying fallback");
    match fetch_with_retry(fetcher, fallback, config).await {
        Ok(bytes) => Ok(bytes),
        Err((e, fallback_attempts)) => Err(Error::Fetch {
            source: e,
            attempts: primary_attempts + fallback_attempts,
        }),
    }
}

/// Fetch one item through the full policy and write it to its target path
///
/// Returns the number of bytes written.
pub async fn download_item(
    fetcher: &dyn Fetcher,
    item: &DownloadItem,
    config: &RetryConfig,
) -> Result<u64> {
    let bytes = fetch_with_fallback(
        fetcher,
        &item.source_url,
        item.fallback_url.as_deref(),
        config,
    )
    .await?;

    if let Some(parent) = item.target_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&item.target_path, &bytes).await?;

    tracing::debug!(
        target = %item.target_path.display(),
        bytes = bytes.len(),
        "Artifact written"
    );
    Ok(bytes.len() as u64)
}

/// Attempt to replace an existing low-quality file with a higher-quality source
///
/// Fetches `source_url` to a temporary sibling of `target`. If the result is
/// strictly larger than the existing file, the target is replaced atomically;
/// otherwise the temporary file is discarded and the original kept. A failed
/// upgrade fetch is logged and reported as "not replaced", never as an error.
///
/// Returns whether the target was replaced.
pub async fn upgrade_in_place(
    fetcher: &dyn Fetcher,
    target: &Path,
    source_url: &str,
    config: &RetryConfig,
) -> Result<bool> {
    let existing_len = tokio::fs::metadata(target).await?.len();

    let bytes = match fetch_with_fallback(fetcher, source_url, None, config).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(target = %target.display(), error = %e, "Quality upgrade fetch failed, keeping existing file");
            return Ok(false);
        }
    };

    let tmp = temp_sibling(target);
    tokio::fs::write(&tmp, &bytes).await?;

    if (bytes.len() as u64) > existing_len {
        tokio::fs::rename(&tmp, target).await?;
        tracing::info!(
            target = %target.display(),
            old_bytes = existing_len,
            new_bytes = bytes.len(),
            "Replaced file with higher-quality source"
        );
        Ok(true)
    } else {
        tokio::fs::remove_file(&tmp).await?;
        tracing::debug!(
            target = %target.display(),
            old_bytes = existing_len,
            new_bytes = bytes.len(),
            "Upgrade candidate not larger, keeping existing file"
        );
        Ok(false)
    }
}

fn temp_sibling(target: &Path) -> std::path::PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    name.push_str(".upgrade.tmp");
    target.with_file_name(name)
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
