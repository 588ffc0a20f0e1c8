//! # profile-dl
//!
//! Resilient batch download engine for profile-style media archives.
//!
//! ## Design Philosophy
//!
//! profile-dl is designed to be:
//! - **Idempotent** - Re-running a batch skips verified work and resumes gaps
//! - **Failure-isolated** - One bad artifact never aborts its batch
//! - **Verification-first** - Completion is proven by on-disk signature checks,
//!   never inferred from transfer success
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use profile_dl::{Config, DownloadItem, EntityKey, HttpFetcher, JsonMediaExtractor, ProfileDownloader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher = Arc::new(HttpFetcher::new(config.download.request_timeout)?);
//!     let downloader = ProfileDownloader::new(config, fetcher, Arc::new(JsonMediaExtractor))?;
//!
//!     let key = EntityKey::new("fanbox", "12345");
//!     let dir = downloader.state().entity_dir(&key);
//!     let items = vec![
//!         DownloadItem::new("https://cdn.example/a.jpg", dir.join("post-1/a.jpg"), 0),
//!         DownloadItem::new("https://cdn.example/b.png", dir.join("post-1/b.png"), 1)
//!             .with_fallback("https://cdn.example/b_thumb.png"),
//!     ];
//!
//!     let stats = downloader
//!         .sync_entity(&key, "https://example.com/fanbox/user/12345", items)
//!         .await?;
//!     println!("{stats}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core download orchestration
pub mod downloader;
/// Error types
pub mod error;
/// HTTP transport and metadata extraction seams
pub mod fetcher;
/// Retry, backoff, and fallback retrieval policy
pub mod retry;
/// Bounded-concurrency task scheduling
pub mod scheduler;
/// Durable per-entity download state
pub mod state;
/// Core types and batch counters
pub mod types;
/// Binary signature verification
pub mod verify;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, RetryConfig};
pub use downloader::{METADATA_FILE_NAME, ProfileDownloader};
pub use error::{Error, FetchError, Result};
pub use fetcher::{Fetcher, HttpFetcher, JsonMediaExtractor, MediaExtractor};
pub use scheduler::TaskScheduler;
pub use state::{EntityState, StateStore, StoreStatistics, STATE_FILE_NAME};
pub use types::{BatchStats, DownloadItem, EntityKey, MediaFile, Outcome};
pub use verify::{check_file, CorruptedFile, FileStatus, VerificationReport};
