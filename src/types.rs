//! Core types shared across the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable identity of a tracked entity (a profile whose content is synced as a unit)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Provider/service name (e.g., "fanbox", "patreon")
    pub service: String,
    /// Owner identifier within the service
    pub user_id: String,
}

impl EntityKey {
    /// Create a new entity key
    pub fn new(service: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.user_id)
    }
}

/// One planned artifact download
///
/// Produced at the ingestion boundary when an item's expected-output list is
/// computed, and consumed once per batch attempt. Never persisted. All items carry
/// this one tagged shape; nothing downstream branches on "bare URL vs descriptor".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    /// Primary locator for the artifact
    pub source_url: String,
    /// Optional alternate locator tried with a full retry budget after the
    /// primary is exhausted
    pub fallback_url: Option<String>,
    /// Absolute path the artifact is written to
    pub target_path: PathBuf,
    /// Position of this artifact within its item's expected-output list
    pub sequence_index: usize,
}

impl DownloadItem {
    /// Create a download item with no fallback locator
    pub fn new(
        source_url: impl Into<String>,
        target_path: impl Into<PathBuf>,
        sequence_index: usize,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            fallback_url: None,
            target_path: target_path.into(),
            sequence_index,
        }
    }

    /// Attach a fallback locator
    pub fn with_fallback(mut self, fallback_url: impl Into<String>) -> Self {
        self.fallback_url = Some(fallback_url.into());
        self
    }

    /// File name component of the target path
    pub fn file_name(&self) -> String {
        self.target_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One expected output artifact described by a provider document
///
/// Produced by [`MediaExtractor::extract`](crate::fetcher::MediaExtractor::extract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Full-quality source URL
    pub url: String,
    /// Provider-supplied file name, when known
    #[serde(default)]
    pub filename: Option<String>,
    /// Lower-quality preview URL, when known
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Per-batch outcome counters
///
/// Reset (freshly constructed) at the start of each batch; mutated only via the
/// per-outcome `record_*` increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Artifacts fetched and written in this batch
    pub completed: usize,
    /// Artifacts that failed terminally in this batch
    pub failed: usize,
    /// Artifacts skipped because they were already correct on disk
    pub skipped: usize,
}

impl BatchStats {
    /// Record one completed artifact
    pub fn record_completed(&mut self) {
        self.completed += 1;
    }

    /// Record one terminally failed artifact
    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    /// Record one skipped artifact
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Total artifacts accounted for in this batch
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Merge another batch's counters into this one
    pub fn merge(&mut self, other: &BatchStats) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed={} failed={} skipped={}",
            self.completed, self.failed, self.skipped
        )
    }
}

/// Non-failure outcome of one unit of scheduled work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact was fetched (or upgraded) and written
    Completed,
    /// The artifact was already correct on disk; no fetch was needed
    Skipped,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_displays_as_service_colon_user() {
        let key = EntityKey::new("fanbox", "12345");
        assert_eq!(key.to_string(), "fanbox:12345");
    }

    #[test]
    fn download_item_file_name_is_target_basename() {
        let item = DownloadItem::new("https://cdn.example/a.jpg", "/out/p1/001_a.jpg", 0);
        assert_eq!(item.file_name(), "001_a.jpg");
        assert!(item.fallback_url.is_none());
    }

    #[test]
    fn with_fallback_sets_alternate_locator() {
        let item = DownloadItem::new("https://cdn.example/a.jpg", "/out/a.jpg", 0)
            .with_fallback("https://mirror.example/a.jpg");
        assert_eq!(
            item.fallback_url.as_deref(),
            Some("https://mirror.example/a.jpg")
        );
    }

    #[test]
    fn batch_stats_increments_and_totals() {
        let mut stats = BatchStats::default();
        stats.record_completed();
        stats.record_completed();
        stats.record_failed();
        stats.record_skipped();
        assert_eq!(
            stats,
            BatchStats {
                completed: 2,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn batch_stats_merge_adds_counters() {
        let mut a = BatchStats {
            completed: 1,
            failed: 2,
            skipped: 3,
        };
        let b = BatchStats {
            completed: 10,
            failed: 0,
            skipped: 1,
        };
        a.merge(&b);
        assert_eq!(
            a,
            BatchStats {
                completed: 11,
                failed: 2,
                skipped: 4
            }
        );
    }

    #[test]
    fn media_file_deserializes_with_missing_optional_fields() {
        let file: MediaFile =
            serde_json::from_str(r#"{"url": "https://cdn.example/x.png"}"#).unwrap();
        assert_eq!(file.url, "https://cdn.example/x.png");
        assert!(file.filename.is_none());
        assert!(file.thumbnail_url.is_none());
    }
}
