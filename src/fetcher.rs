//! External collaborator capabilities
//!
//! The engine never implements its own transport or scraping logic. It consumes
//! two narrow capabilities:
//!
//! - [`Fetcher`]: retrieve bytes for a locator, failing with a classified
//!   [`FetchError`]
//! - [`MediaExtractor`]: turn a provider-returned descriptive document into the
//!   list of expected output artifacts
//!
//! [`HttpFetcher`] is the bundled reqwest-backed adapter. Consumers with special
//! transports (browser automation, provider SDKs, cloud-storage clients) inject
//! their own implementations.

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Abstraction over byte retrieval, enabling testability and custom transports
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full response body for a locator
    ///
    /// Implementations must enforce a transport-level timeout so no fetch can
    /// block indefinitely, and must map failures onto [`FetchError`] so the
    /// retrieval policy can classify them.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Abstraction over expected-output extraction from provider documents
pub trait MediaExtractor: Send + Sync {
    /// Describe the expected output artifacts of one item's descriptive document
    fn extract(&self, document: &serde_json::Value) -> Vec<crate::types::MediaFile>;
}

/// Production [`Fetcher`] backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (custom headers, proxies, cookie stores)
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await.map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        response.bytes().await.map_err(FetchError::from)
    }
}

/// Default extractor for provider documents shaped like
/// `{"attachments": [{"url", "filename"?, "thumbnailUrl"?}, ...]}`
///
/// Also accepts a bare top-level array of the same objects. Entries without a
/// `url` are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMediaExtractor;

impl MediaExtractor for JsonMediaExtractor {
    fn extract(&self, document: &serde_json::Value) -> Vec<crate::types::MediaFile> {
        let entries = match document {
            serde_json::Value::Array(items) => items.as_slice(),
            serde_json::Value::Object(map) => match map.get("attachments") {
                Some(serde_json::Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };

        entries
            .iter()
            .filter_map(|entry| {
                let url = entry.get("url")?.as_str()?.to_string();
                Some(crate::types::MediaFile {
                    url,
                    filename: entry
                        .get("filename")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    thumbnail_url: entry
                        .get("thumbnailUrl")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                })
            })
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // -----------------------------------------------------------------------
    // HttpFetcher status mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn http_fetcher_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0x01]))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let bytes = fetcher
            .fetch(&format!("{}/image.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0xFF, 0xD8, 0x01]);
    }

    #[tokio::test]
    async fn http_fetcher_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err, FetchError::NotFound);
    }

    #[tokio::test]
    async fn http_fetcher_maps_503_to_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err, FetchError::Server { status: 503 });
    }

    #[tokio::test]
    async fn http_fetcher_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err, FetchError::RateLimited);
    }

    #[tokio::test]
    async fn http_fetcher_maps_connection_refused_to_connection_error() {
        // Port 1 on localhost is essentially guaranteed to refuse connections
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:1/x").await.unwrap_err();
        assert!(
            matches!(err, FetchError::Connection(_) | FetchError::Timeout),
            "expected a transport-level error, got {err:?}"
        );
    }

    // -----------------------------------------------------------------------
    // JsonMediaExtractor
    // -----------------------------------------------------------------------

    #[test]
    fn extractor_reads_attachments_array() {
        let doc = serde_json::json!({
            "id": "p1",
            "attachments": [
                {"url": "https://cdn.example/a.jpg", "filename": "a.jpg"},
                {"url": "https://cdn.example/b.mp4", "thumbnailUrl": "https://cdn.example/b_thumb.jpg"},
            ]
        });

        let files = JsonMediaExtractor.extract(&doc);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename.as_deref(), Some("a.jpg"));
        assert_eq!(
            files[1].thumbnail_url.as_deref(),
            Some("https://cdn.example/b_thumb.jpg")
        );
    }

    #[test]
    fn extractor_accepts_bare_top_level_array() {
        let doc = serde_json::json!([{"url": "https://cdn.example/x.png"}]);
        let files = JsonMediaExtractor.extract(&doc);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url, "https://cdn.example/x.png");
    }

    #[test]
    fn extractor_skips_entries_without_url() {
        let doc = serde_json::json!({
            "attachments": [
                {"filename": "orphan.jpg"},
                {"url": "https://cdn.example/kept.jpg"},
            ]
        });
        let files = JsonMediaExtractor.extract(&doc);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url, "https://cdn.example/kept.jpg");
    }

    #[test]
    fn extractor_returns_empty_for_non_document_values() {
        assert!(JsonMediaExtractor.extract(&serde_json::json!(null)).is_empty());
        assert!(JsonMediaExtractor.extract(&serde_json::json!(42)).is_empty());
        assert!(
            JsonMediaExtractor
                .extract(&serde_json::json!({"no_attachments": true}))
                .is_empty()
        );
    }
}
