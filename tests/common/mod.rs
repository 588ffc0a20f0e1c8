//! Common test utilities for profile-dl integration tests

use async_trait::async_trait;
use bytes::Bytes;
use profile_dl::{Config, FetchError, Fetcher, JsonMediaExtractor, ProfileDownloader};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Minimal valid JPEG payload (SOI marker plus filler)
#[allow(dead_code)]
pub fn jpeg_bytes(extra: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend(std::iter::repeat_n(0xAB, extra));
    bytes
}

/// Minimal valid PNG payload
#[allow(dead_code)]
pub fn png_bytes(extra: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend(std::iter::repeat_n(0xCD, extra));
    bytes
}

/// Fetcher serving canned responses keyed by URL, with a global call counter
///
/// URLs without an entry fail with `FetchError::NotFound`.
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Result<Bytes, FetchError>>>,
    calls: AtomicU32,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn serve(self, url: &str, payload: Vec<u8>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(Bytes::from(payload)));
        self
    }

    pub fn fail(self, url: &str, error: FetchError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(e)) => Err(clone_error(e)),
            None => Err(FetchError::NotFound),
        }
    }
}

fn clone_error(e: &FetchError) -> FetchError {
    match e {
        FetchError::Server { status } => FetchError::Server { status: *status },
        FetchError::RateLimited => FetchError::RateLimited,
        FetchError::Forbidden => FetchError::Forbidden,
        FetchError::NotFound => FetchError::NotFound,
        FetchError::Client { status } => FetchError::Client { status: *status },
        FetchError::Timeout => FetchError::Timeout,
        FetchError::Connection(msg) => FetchError::Connection(msg.clone()),
        FetchError::QuotaExceeded => FetchError::QuotaExceeded,
        FetchError::InvalidCredentials => FetchError::InvalidCredentials,
    }
}

/// Build a downloader rooted in a fresh temp dir with zero retry backoff
#[allow(dead_code)]
pub fn create_test_downloader(fetcher: Arc<MockFetcher>) -> (ProfileDownloader, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (downloader, _) = create_test_downloader_in(fetcher, temp_dir.path());
    (downloader, temp_dir)
}

/// Build a downloader rooted at an existing directory
#[allow(dead_code)]
pub fn create_test_downloader_in(
    fetcher: Arc<MockFetcher>,
    root: &Path,
) -> (ProfileDownloader, Config) {
    let mut config = Config::default();
    config.download.download_dir = root.to_path_buf();
    config.download.max_concurrent_downloads = 2;
    config.retry.max_attempts = 1;
    config.retry.backoff = std::time::Duration::from_millis(0);
    let downloader = ProfileDownloader::new(config.clone(), fetcher, Arc::new(JsonMediaExtractor))
        .expect("test config is valid");
    (downloader, config)
}
