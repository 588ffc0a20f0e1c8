//! Durable per-entity progress tracking
//!
//! Each tracked entity owns one JSON record stored alongside its own output
//! (`<entity_dir>/.download-state.json`), so progress travels with the content
//! instead of depending on a single global index file. A centralized index would
//! force write serialization across all writers and be a single point of
//! corruption; per-entity files are naturally partitioned.
//!
//! Records are written through synchronously on every mutation using a
//! read-modify-overwrite rule: read current contents if present, apply the
//! change, rewrite the whole file. A record that fails to parse is treated as
//! absent on read; only mutating calls raise errors.
//!
//! The legacy centralized-index format (one JSON document mapping entity keys to
//! records) remains loadable via [`StateStore::migrate_legacy_index`].

use crate::error::{Error, Result};
use crate::types::EntityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed hidden file name of the per-entity state record
pub const STATE_FILE_NAME: &str = ".download-state.json";

/// Current on-disk record format version
pub const STATE_VERSION: u32 = 2;

/// Durable progress record for one entity
///
/// Owned exclusively by the [`StateStore`]; callers read snapshots and request
/// mutations through store operations, never edit records directly.
/// `completed` is only ever set by [`StateStore::mark_completed`], never
/// inferred elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Whether the entity has been verified complete
    pub completed: bool,
    /// When the entity was verified complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// The profile URL this entity was synced from
    pub profile_url: String,
    /// Provider/service name
    pub service: String,
    /// Owner identifier within the service
    pub user_id: String,
    /// Total expected posts for this entity
    pub total_posts: u64,
    /// Total expected media artifacts, when known
    #[serde(default)]
    pub total_images: u64,
    /// Item failures recorded across runs
    #[serde(default)]
    pub total_errors: u64,
    /// Record format version
    pub version: u32,
    /// When the record was last mutated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Posts confirmed complete so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_posts: Option<u64>,
    /// Media artifacts confirmed complete so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_images: Option<u64>,
    /// When tracking for this entity first began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl EntityState {
    /// Total expected units for this entity
    pub fn total_expected(&self) -> u64 {
        self.total_posts
    }

    /// Units confirmed complete so far
    pub fn completed_count(&self) -> u64 {
        self.downloaded_posts.unwrap_or(0)
    }

    /// Entity key this record belongs to
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.service.clone(), self.user_id.clone())
    }
}

/// Aggregate statistics across all tracked entities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatistics {
    /// Entities with a state record
    pub tracked_entities: usize,
    /// Entities marked completed
    pub completed_entities: usize,
    /// Entities tracked but not yet completed
    pub in_progress_entities: usize,
    /// Summed expected units across all records
    pub total_expected: u64,
    /// Summed completed units across all records
    pub total_completed: u64,
}

/// Legacy centralized-index document (`profiles` keyed by `<service>:<user_id>`)
#[derive(Debug, Deserialize)]
struct LegacyIndex {
    #[serde(default)]
    profiles: HashMap<String, LegacyRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    service: String,
    user_id: String,
    #[serde(default)]
    total_posts: u64,
    #[serde(default)]
    downloaded_posts: Option<u64>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_updated_at: Option<DateTime<Utc>>,
}

/// Durable, per-entity resumable progress store
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Create a store rooted at the download directory
    ///
    /// Entity records live at `<root>/<service>/<user_id>/.download-state.json`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory for one entity
    pub fn entity_dir(&self, key: &EntityKey) -> PathBuf {
        self.root.join(&key.service).join(&key.user_id)
    }

    fn state_path(&self, key: &EntityKey) -> PathBuf {
        self.entity_dir(key).join(STATE_FILE_NAME)
    }

    /// Load the current record for an entity
    ///
    /// A missing or unparsable record reads as `None`; read paths never raise.
    pub fn load(&self, key: &EntityKey) -> Option<EntityState> {
        Self::read_record(&self.state_path(key))
    }

    fn read_record(path: &Path) -> Option<EntityState> {
        let bytes = fs::read(path).ok()?;
        match serde_json::from_slice::<EntityState>(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unparsable state record, treating as absent");
                None
            }
        }
    }

    /// Create or refresh the record for an entity (write-through)
    ///
    /// Preserves a prior record's `completed_count` and `started_at`; resets
    /// `completed` to false. The record only returns to completed through
    /// [`mark_completed`](Self::mark_completed) after verification.
    pub fn initialize(
        &self,
        key: &EntityKey,
        total_expected: u64,
        profile_url: &str,
    ) -> Result<EntityState> {
        let now = Utc::now();
        let prior = self.load(key);

        let state = EntityState {
            completed: false,
            completed_at: None,
            profile_url: profile_url.to_string(),
            service: key.service.clone(),
            user_id: key.user_id.clone(),
            total_posts: total_expected,
            total_images: prior.as_ref().map(|p| p.total_images).unwrap_or(0),
            total_errors: prior.as_ref().map(|p| p.total_errors).unwrap_or(0),
            version: STATE_VERSION,
            last_updated_at: Some(now),
            downloaded_posts: prior.as_ref().and_then(|p| p.downloaded_posts),
            downloaded_images: prior.as_ref().and_then(|p| p.downloaded_images),
            started_at: prior.and_then(|p| p.started_at).or(Some(now)),
        };

        self.write_record(key, &state)?;
        Ok(state)
    }

    /// Update the completed-unit count for an entity (write-through)
    pub fn update_progress(&self, key: &EntityKey, completed_count: u64) -> Result<()> {
        let mut state = self
            .load(key)
            .ok_or_else(|| Error::StateNotInitialized {
                key: key.to_string(),
            })?;

        state.downloaded_posts = Some(completed_count);
        state.last_updated_at = Some(Utc::now());
        self.write_record(key, &state)
    }

    /// Record item failures for an entity (write-through)
    pub fn record_errors(&self, key: &EntityKey, errors: u64) -> Result<()> {
        let mut state = self
            .load(key)
            .ok_or_else(|| Error::StateNotInitialized {
                key: key.to_string(),
            })?;

        state.total_errors += errors;
        state.last_updated_at = Some(Utc::now());
        self.write_record(key, &state)
    }

    /// Mark an entity verified complete (write-through)
    ///
    /// This is the only operation that sets `completed`.
    pub fn mark_completed(&self, key: &EntityKey) -> Result<()> {
        let mut state = self
            .load(key)
            .ok_or_else(|| Error::StateNotInitialized {
                key: key.to_string(),
            })?;

        let now = Utc::now();
        state.completed = true;
        state.completed_at = Some(now);
        state.last_updated_at = Some(now);
        self.write_record(key, &state)
    }

    /// Delete an entity's record
    pub fn reset(&self, key: &EntityKey) -> Result<()> {
        match fs::remove_file(self.state_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Aggregate statistics across all tracked entities
    ///
    /// Scans `<root>/<service>/<user_id>` directories; unreadable or unparsable
    /// records are skipped.
    pub fn statistics(&self) -> StoreStatistics {
        let mut stats = StoreStatistics::default();

        let services = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return stats,
        };

        for service in services.flatten() {
            let users = match fs::read_dir(service.path()) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for user in users.flatten() {
                let Some(state) = Self::read_record(&user.path().join(STATE_FILE_NAME)) else {
                    continue;
                };
                stats.tracked_entities += 1;
                if state.completed {
                    stats.completed_entities += 1;
                } else {
                    stats.in_progress_entities += 1;
                }
                stats.total_expected += state.total_expected();
                stats.total_completed += state.completed_count();
            }
        }

        stats
    }

    /// Migrate a legacy centralized index into per-entity records
    ///
    /// Fans each `profiles` entry out to its entity's directory. Idempotent:
    /// entities that already have a per-entity record are left untouched.
    /// Returns the number of records written.
    pub fn migrate_legacy_index(&self, index_path: &Path) -> Result<usize> {
        let bytes = fs::read(index_path)?;
        let index: LegacyIndex = serde_json::from_slice(&bytes)?;

        let mut migrated = 0;
        for legacy in index.profiles.into_values() {
            let key = EntityKey::new(legacy.service.clone(), legacy.user_id.clone());
            if self.load(&key).is_some() {
                tracing::debug!(entity = %key, "Per-entity record already exists, skipping legacy entry");
                continue;
            }

            let state = EntityState {
                completed: legacy.completed,
                completed_at: legacy.completed_at,
                profile_url: String::new(),
                service: legacy.service,
                user_id: legacy.user_id,
                total_posts: legacy.total_posts,
                total_images: 0,
                total_errors: 0,
                version: STATE_VERSION,
                last_updated_at: legacy.last_updated_at,
                downloaded_posts: legacy.downloaded_posts,
                downloaded_images: None,
                started_at: legacy.started_at,
            };
            self.write_record(&key, &state)?;
            migrated += 1;
        }

        tracing::info!(count = migrated, index = %index_path.display(), "Migrated legacy state index");
        Ok(migrated)
    }

    /// Serialize and rewrite an entity's record (full rewrite, atomic rename)
    fn write_record(&self, key: &EntityKey, state: &EntityState) -> Result<()> {
        let persist = |e: std::io::Error| Error::Persistence {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let dir = self.entity_dir(key);
        fs::create_dir_all(&dir).map_err(persist)?;

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = dir.join(format!("{STATE_FILE_NAME}.tmp"));
        fs::write(&tmp, json).map_err(persist)?;
        fs::rename(&tmp, self.state_path(key)).map_err(persist)?;
        Ok(())
    }
}
