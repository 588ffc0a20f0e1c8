//! Core download orchestration
//!
//! Composes the state store, integrity verifier, task scheduler, and retrieval
//! policy to decide, per entity, whether to skip, partially resume, or fully
//! fetch its expected artifacts:
//!
//! 1. **Quick check**: the state record claims completion and a lightweight
//!    filesystem probe agrees (metadata sidecar present and at least one media
//!    file on disk), so skip without any network call.
//! 2. **Thorough check**: with an expected-file list (caller-supplied or
//!    recomputed from `post-metadata.json` sidecars), verify signatures on disk
//!    and fetch only the missing/corrupted subset.
//! 3. After every batch the full expected set is re-verified; a clean fetch
//!    report alone never proves byte-correctness.
//!
//! The entity state only advances to completed after thorough verification
//! confirms completeness. Item failures are tallied and logged; they never
//! abort the containing batch.

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{Fetcher, MediaExtractor};
use crate::retry;
use crate::scheduler::TaskScheduler;
use crate::state::StateStore;
use crate::types::{BatchStats, DownloadItem, EntityKey, MediaFile, Outcome};
use crate::verify;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Fixed file name of the per-item descriptive metadata sidecar
pub const METADATA_FILE_NAME: &str = "post-metadata.json";

/// Planned action for one artifact within a batch
#[derive(Debug, Clone)]
enum ItemPlan {
    /// Artifact is missing or corrupted; fetch it through the retry policy
    Fetch(DownloadItem),
    /// Artifact is valid but small; try to replace it from its full-quality source
    Upgrade(DownloadItem),
}

/// Resilient batch download orchestrator
pub struct ProfileDownloader {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn MediaExtractor>,
    store: StateStore,
    scheduler: Arc<TaskScheduler>,
}

impl ProfileDownloader {
    /// Create an orchestrator with injected transport and extraction capabilities
    ///
    /// Fails with [`Error::Config`](crate::error::Error::Config) when the
    /// configuration is invalid.
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn MediaExtractor>,
    ) -> Result<Self> {
        config.validate()?;
        let store = StateStore::new(config.download_dir());
        let scheduler = Arc::new(TaskScheduler::new(config.download.max_concurrent_downloads));
        Ok(Self {
            config,
            fetcher,
            extractor,
            store,
            scheduler,
        })
    }

    /// The underlying state store
    pub fn state(&self) -> &StateStore {
        &self.store
    }

    /// The underlying task scheduler (for ceiling adjustment and observability)
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Synchronize one entity's expected artifacts with disk
    ///
    /// `items` is the expected-output list computed by the caller's ingestion
    /// layer. When it is empty, the list is recomputed from the entity's
    /// `post-metadata.json` sidecars. Returns the batch outcome counters; item
    /// failures are tallied, never raised.
    pub async fn sync_entity(
        &self,
        key: &EntityKey,
        profile_url: &str,
        items: Vec<DownloadItem>,
    ) -> Result<BatchStats> {
        let entity_dir = self.store.entity_dir(key);

        let items = if items.is_empty() {
            self.expected_from_sidecars(key)?
        } else {
            items
        };

        // Quick check: trust a completed record when the filesystem agrees
        if let Some(state) = self.store.load(key) {
            if state.completed && quick_probe(&entity_dir) {
                tracing::info!(entity = %key, "Already completed, quick check passed, skipping");
                return Ok(BatchStats {
                    skipped: items.len(),
                    ..Default::default()
                });
            }
        }

        if items.is_empty() {
            tracing::warn!(entity = %key, "No expected artifacts and no metadata sidecars, nothing to do");
            return Ok(BatchStats::default());
        }

        // Thorough check: verify signatures, then fetch gaps and upgrade
        // suspiciously small files
        let (report, plans, mut stats) = self.plan_batch(&items);

        if plans.is_empty() {
            tracing::info!(
                entity = %key,
                files = report.present_count,
                "All expected artifacts verified on disk, skipping fetch"
            );
            if self.store.load(key).is_none() {
                self.store
                    .initialize(key, items.len() as u64, profile_url)?;
            }
            self.tick_progress(key, report.present_count as u64);
            self.store.mark_completed(key)?;
            return Ok(BatchStats {
                skipped: items.len(),
                ..Default::default()
            });
        }

        tracing::info!(
            entity = %key,
            expected = report.total_expected,
            present = report.present_count,
            missing = report.missing_files.len(),
            corrupted = report.corrupted_files.len(),
            planned = plans.len(),
            "Verification left work to do, running batch"
        );

        self.store
            .initialize(key, items.len() as u64, profile_url)?;

        let run_stats = self.run_plans(plans).await;
        stats.merge(&run_stats);

        // A clean fetch report is not proof of byte-correctness: re-verify everything
        let final_report = verify::verify_items(&items);
        self.tick_progress(key, final_report.present_count as u64);
        if stats.failed > 0 {
            if let Err(e) = self.store.record_errors(key, stats.failed as u64) {
                tracing::warn!(entity = %key, error = %e, "Failed to record item errors");
            }
        }

        if final_report.all_present() {
            self.store.mark_completed(key)?;
            tracing::info!(entity = %key, %stats, "Entity verified complete");
        } else {
            tracing::warn!(
                entity = %key,
                %stats,
                missing = final_report.missing_files.len(),
                corrupted = final_report.corrupted_files.len(),
                "Entity still incomplete after batch"
            );
        }

        Ok(stats)
    }

    /// Best-effort progress write; failures are logged, never raised
    fn tick_progress(&self, key: &EntityKey, completed_count: u64) {
        if let Err(e) = self.store.update_progress(key, completed_count) {
            tracing::warn!(entity = %key, error = %e, "Failed to persist progress");
        }
    }

    /// Check each artifact's own path and decide: fetch, upgrade, or skip
    ///
    /// Statuses are taken per `target_path`, never by file name, so same-named
    /// artifacts in different post directories stay independent.
    fn plan_batch(
        &self,
        items: &[DownloadItem],
    ) -> (verify::VerificationReport, Vec<ItemPlan>, BatchStats) {
        let threshold = self.config.download.upgrade_threshold_bytes;

        let mut report = verify::VerificationReport {
            total_expected: items.len(),
            ..Default::default()
        };
        let mut plans = Vec::new();
        let mut stats = BatchStats::default();

        for item in items {
            match verify::check_file(&item.target_path) {
                verify::FileStatus::Missing => {
                    report.missing_files.push(item.file_name());
                    plans.push(ItemPlan::Fetch(item.clone()));
                }
                verify::FileStatus::Corrupted(reason) => {
                    report.corrupted_files.push(verify::CorruptedFile {
                        name: item.file_name(),
                        reason,
                    });
                    plans.push(ItemPlan::Fetch(item.clone()));
                }
                verify::FileStatus::Valid => {
                    report.present_count += 1;
                    // Valid but suspiciously small files may be thumbnails
                    // from an earlier run; try their full-quality source.
                    let small = fs::metadata(&item.target_path)
                        .map(|m| m.len() < threshold)
                        .unwrap_or(false);
                    if small {
                        plans.push(ItemPlan::Upgrade(item.clone()));
                    } else {
                        stats.record_skipped();
                    }
                }
            }
        }

        (report, plans, stats)
    }

    /// Execute planned actions under the concurrency ceiling
    async fn run_plans(&self, plans: Vec<ItemPlan>) -> BatchStats {
        if plans.is_empty() {
            return BatchStats::default();
        }

        let fetcher = Arc::clone(&self.fetcher);
        let retry_config = self.config.retry.clone();

        self.scheduler
            .run(plans, move |plan| {
                let fetcher = Arc::clone(&fetcher);
                let retry_config = retry_config.clone();
                async move {
                    match plan {
                        ItemPlan::Fetch(item) => {
                            retry::download_item(fetcher.as_ref(), &item, &retry_config).await?;
                            Ok(Outcome::Completed)
                        }
                        ItemPlan::Upgrade(item) => {
                            let replaced = retry::upgrade_in_place(
                                fetcher.as_ref(),
                                &item.target_path,
                                &item.source_url,
                                &retry_config,
                            )
                            .await?;
                            Ok(if replaced {
                                Outcome::Completed
                            } else {
                                Outcome::Skipped
                            })
                        }
                    }
                }
            })
            .await
    }

    /// Recompute the expected-artifact list from `post-metadata.json` sidecars
    ///
    /// Scans the entity's item subdirectories; items whose sidecar is missing or
    /// unparsable contribute nothing. Returns an empty list when no sidecars
    /// exist (no manifest obtainable).
    pub fn expected_from_sidecars(&self, key: &EntityKey) -> Result<Vec<DownloadItem>> {
        let entity_dir = self.store.entity_dir(key);
        let mut items = Vec::new();

        let entries = match fs::read_dir(&entity_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
            Err(e) => return Err(e.into()),
        };

        let mut item_dirs: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        item_dirs.sort();

        for item_dir in item_dirs {
            let sidecar = item_dir.join(METADATA_FILE_NAME);
            let Ok(bytes) = fs::read(&sidecar) else {
                continue;
            };
            let document: serde_json::Value = match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(path = %sidecar.display(), error = %e, "Unparsable metadata sidecar, skipping item");
                    continue;
                }
            };

            for media in self.extractor.extract(&document) {
                let index = items.len();
                let target = item_dir.join(filename_for(&media, index));
                let mut item = DownloadItem::new(media.url.clone(), target, index);
                if let Some(thumbnail) = media.thumbnail_url {
                    item = item.with_fallback(thumbnail);
                }
                items.push(item);
            }
        }

        Ok(items)
    }
}

/// Lightweight completion probe: a metadata sidecar exists and at least one
/// media artifact is on disk
///
/// Looks at the entity directory and its immediate item subdirectories.
fn quick_probe(entity_dir: &Path) -> bool {
    fn scan_dir(dir: &Path, saw_metadata: &mut bool, saw_media: &mut bool) -> Vec<std::path::PathBuf> {
        let mut subdirs = Vec::new();
        let Ok(entries) = fs::read_dir(dir) else {
            return subdirs;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == METADATA_FILE_NAME {
                *saw_metadata = true;
            } else if !name.starts_with('.') {
                *saw_media = true;
            }
        }
        subdirs
    }

    let mut saw_metadata = false;
    let mut saw_media = false;
    let subdirs = scan_dir(entity_dir, &mut saw_metadata, &mut saw_media);
    for dir in &subdirs {
        if saw_metadata && saw_media {
            break;
        }
        scan_dir(dir, &mut saw_metadata, &mut saw_media);
    }

    saw_metadata && saw_media
}

/// Pick a target file name for an extracted media entry
///
/// Prefers the provider-supplied name, then the last URL path segment, then a
/// sequence-derived placeholder.
fn filename_for(media: &MediaFile, index: usize) -> String {
    if let Some(name) = media.filename.as_deref() {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    if let Ok(parsed) = url::Url::parse(&media.url) {
        if let Some(segment) = parsed
            .path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|s| !s.is_empty())
        {
            return segment.to_string();
        }
    }
    format!("{index:03}.bin")
}
