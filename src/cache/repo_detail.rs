// Per-repository detail cache with independently timestamped fields.
// Mirrored in memory and persisted to disk as one JSON blob per repository.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::github::{ActivityEvent, CiStatusDetails, HeatmapCell, Release, TrafficStats};

use super::paths;
use super::store::{self, is_fresh};

/// Cached detail fields for one `(api host, owner, name)`.
///
/// Each value is paired with the time it was fetched. `traffic` and
/// `latest_release` may legitimately be `None` after a successful fetch,
/// so freshness is always judged from the timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoDetailCache {
    pub open_pulls: Option<u64>,
    pub open_pulls_fetched_at: Option<DateTime<Utc>>,
    pub ci_details: Option<CiStatusDetails>,
    pub ci_fetched_at: Option<DateTime<Utc>>,
    pub latest_activity: Option<ActivityEvent>,
    pub activity_events: Option<Vec<ActivityEvent>>,
    pub activity_fetched_at: Option<DateTime<Utc>>,
    pub traffic: Option<TrafficStats>,
    pub traffic_fetched_at: Option<DateTime<Utc>>,
    pub heatmap: Option<Vec<HeatmapCell>>,
    pub heatmap_fetched_at: Option<DateTime<Utc>>,
    pub latest_release: Option<Release>,
    pub release_fetched_at: Option<DateTime<Utc>>,
    pub discussions_enabled: Option<bool>,
    pub discussions_checked_at: Option<DateTime<Utc>>,
}

/// Freshness of a single cached field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCacheState {
    pub fetched_at: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

impl FieldCacheState {
    fn evaluate(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let needs_refresh = match fetched_at {
            Some(at) => !is_fresh(at, now, ttl),
            None => true,
        };
        Self {
            fetched_at,
            needs_refresh,
        }
    }
}

/// Derived per-field freshness. Recomputed on every call, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoDetailCacheState {
    pub open_pulls: FieldCacheState,
    pub ci: FieldCacheState,
    pub activity: FieldCacheState,
    pub traffic: FieldCacheState,
    pub heatmap: FieldCacheState,
    pub release: FieldCacheState,
    pub discussions: FieldCacheState,
}

impl RepoDetailCacheState {
    /// Number of remote fields (excluding the discussions flag) that are stale.
    pub fn stale_field_count(&self) -> usize {
        [
            self.open_pulls,
            self.ci,
            self.activity,
            self.traffic,
            self.heatmap,
            self.release,
        ]
        .iter()
        .filter(|field| field.needs_refresh)
        .count()
    }
}

/// TTL per field. Cheap volatile fields expire quickly, expensive ones slowly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDetailCachePolicy {
    pub open_pulls_ttl: Duration,
    pub ci_ttl: Duration,
    pub activity_ttl: Duration,
    pub traffic_ttl: Duration,
    pub heatmap_ttl: Duration,
    pub release_ttl: Duration,
    pub discussions_ttl: Duration,
}

impl Default for RepoDetailCachePolicy {
    fn default() -> Self {
        crate::config::DetailTtlConfig::default().policy()
    }
}

impl RepoDetailCachePolicy {
    pub fn state(&self, cache: &RepoDetailCache, now: DateTime<Utc>) -> RepoDetailCacheState {
        RepoDetailCacheState {
            open_pulls: FieldCacheState::evaluate(cache.open_pulls_fetched_at, now, self.open_pulls_ttl),
            ci: FieldCacheState::evaluate(cache.ci_fetched_at, now, self.ci_ttl),
            activity: FieldCacheState::evaluate(cache.activity_fetched_at, now, self.activity_ttl),
            traffic: FieldCacheState::evaluate(cache.traffic_fetched_at, now, self.traffic_ttl),
            heatmap: FieldCacheState::evaluate(cache.heatmap_fetched_at, now, self.heatmap_ttl),
            release: FieldCacheState::evaluate(cache.release_fetched_at, now, self.release_ttl),
            discussions: FieldCacheState::evaluate(
                cache.discussions_checked_at,
                now,
                self.discussions_ttl,
            ),
        }
    }
}

/// On-disk side of the detail cache.
#[derive(Debug, Clone)]
pub struct RepoDetailCacheStore {
    base_dir: PathBuf,
}

impl RepoDetailCacheStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store rooted at the platform cache directory.
    pub fn default_location() -> Option<Self> {
        paths::cache_dir().map(Self::new)
    }

    /// Unreadable or corrupt blobs are treated as misses.
    pub fn load(&self, api_host: &str, owner: &str, name: &str) -> Option<RepoDetailCache> {
        let path = paths::repo_detail_path(&self.base_dir, api_host, owner, name);
        match store::read_json(&path) {
            Ok(cache) => cache,
            Err(e) => {
                log::debug!("Ignoring unreadable detail cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, cache: &RepoDetailCache, api_host: &str, owner: &str, name: &str) -> Result<()> {
        let path = paths::repo_detail_path(&self.base_dir, api_host, owner, name);
        store::write_json(&path, cache)
    }

    pub fn clear(&self) -> Result<()> {
        store::delete_dir(&paths::repo_details_dir(&self.base_dir))
    }
}

/// In-memory mirror of the detail cache, loading lazily from disk.
#[derive(Debug, Default)]
pub struct RepoDetailStore {
    memory: HashMap<String, RepoDetailCache>,
    disk: Option<RepoDetailCacheStore>,
    saves: usize,
}

impl RepoDetailStore {
    pub fn new(disk: Option<RepoDetailCacheStore>) -> Self {
        Self {
            memory: HashMap::new(),
            disk,
            saves: 0,
        }
    }

    /// Memory-only store, used when no cache directory is available.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Cached entry for a repository, empty if nothing was ever stored.
    pub fn load(&mut self, api_host: &str, owner: &str, name: &str) -> RepoDetailCache {
        let key = cache_key(api_host, owner, name);
        if let Some(cache) = self.memory.get(&key) {
            return cache.clone();
        }
        let cache = self
            .disk
            .as_ref()
            .and_then(|disk| disk.load(api_host, owner, name))
            .unwrap_or_default();
        self.memory.insert(key, cache.clone());
        cache
    }

    /// Write the entry to memory and disk. Disk failures are logged, not raised.
    pub fn save(&mut self, cache: RepoDetailCache, api_host: &str, owner: &str, name: &str) {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.save(&cache, api_host, owner, name) {
                log::warn!("Failed to persist detail cache for {}/{}: {}", owner, name, e);
            }
        }
        self.memory.insert(cache_key(api_host, owner, name), cache);
        self.saves += 1;
    }

    /// Number of entries written since the store was created.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn clear(&mut self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                log::warn!("Failed to clear detail cache on disk: {}", e);
            }
        }
    }

    /// Discussions flag if it was checked within `ttl` of `now`.
    pub fn discussions_enabled(
        &mut self,
        api_host: &str,
        owner: &str,
        name: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<bool> {
        let cache = self.load(api_host, owner, name);
        let checked_at = cache.discussions_checked_at?;
        if !is_fresh(checked_at, now, ttl) {
            return None;
        }
        cache.discussions_enabled
    }

    /// Record the discussions flag. Returns true when the stored value changed.
    pub fn update_discussions_enabled(
        &mut self,
        api_host: &str,
        owner: &str,
        name: &str,
        enabled: bool,
        checked_at: DateTime<Utc>,
    ) -> bool {
        let mut cache = self.load(api_host, owner, name);
        let changed = cache.discussions_enabled != Some(enabled);
        cache.discussions_enabled = Some(enabled);
        cache.discussions_checked_at = Some(checked_at);
        self.save(cache, api_host, owner, name);
        changed
    }
}

fn cache_key(api_host: &str, owner: &str, name: &str) -> String {
    format!(
        "{}|{}/{}",
        api_host.trim_end_matches('/').to_lowercase(),
        owner.to_lowercase(),
        name.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::CiStatus;
    use tempfile::TempDir;

    const HOST: &str = "https://api.github.com";

    fn policy() -> RepoDetailCachePolicy {
        RepoDetailCachePolicy::default()
    }

    #[test]
    fn test_empty_cache_needs_everything() {
        let state = policy().state(&RepoDetailCache::default(), Utc::now());
        assert_eq!(state.stale_field_count(), 6);
        assert!(state.discussions.needs_refresh);
    }

    #[test]
    fn test_fields_expire_independently() {
        let now = Utc::now();
        let policy = policy();
        let cache = RepoDetailCache {
            open_pulls: Some(3),
            open_pulls_fetched_at: Some(now),
            ci_details: Some(CiStatusDetails {
                status: CiStatus::Passing,
                run_count: Some(4),
            }),
            ci_fetched_at: Some(now - chrono::Duration::from_std(policy.ci_ttl).unwrap() - chrono::Duration::seconds(1)),
            traffic_fetched_at: Some(now),
            ..Default::default()
        };

        let state = policy.state(&cache, now);
        assert!(!state.open_pulls.needs_refresh);
        assert!(state.ci.needs_refresh);
        assert!(!state.traffic.needs_refresh);
        assert!(state.release.needs_refresh);
    }

    #[test]
    fn test_discussions_capability_respects_ttl() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = RepoDetailStore::new(Some(RepoDetailCacheStore::new(temp_dir.path())));
        let now = Utc::now();

        store.update_discussions_enabled(HOST, "steipete", "RepoBar", false, now);

        let ttl = Duration::from_secs(60);
        assert_eq!(store.discussions_enabled(HOST, "steipete", "RepoBar", now, ttl), Some(false));
        let later = now + chrono::Duration::seconds(61);
        assert_eq!(store.discussions_enabled(HOST, "steipete", "RepoBar", later, ttl), None);
    }

    #[test]
    fn test_discussions_capability_persists_across_stores() {
        let temp_dir = TempDir::new().unwrap();
        let now = Utc::now();

        let mut writer = RepoDetailStore::new(Some(RepoDetailCacheStore::new(temp_dir.path())));
        assert!(writer.update_discussions_enabled(HOST, "steipete", "RepoBar", true, now));
        assert!(!writer.update_discussions_enabled(HOST, "steipete", "RepoBar", true, now));

        let mut reader = RepoDetailStore::new(Some(RepoDetailCacheStore::new(temp_dir.path())));
        let ttl = Duration::from_secs(3600);
        assert_eq!(reader.discussions_enabled(HOST, "steipete", "RepoBar", now, ttl), Some(true));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut store = RepoDetailStore::in_memory();
        let cache = RepoDetailCache {
            open_pulls: Some(9),
            ..Default::default()
        };
        store.save(cache, HOST, "SteiPete", "RepoBar");
        assert_eq!(store.load(HOST, "steipete", "repobar").open_pulls, Some(9));
        assert_eq!(store.load("https://ghe.corp/api/v3", "steipete", "repobar").open_pulls, None);
    }

    #[test]
    fn test_clear_wipes_memory_and_disk() {
        let temp_dir = TempDir::new().unwrap();
        let disk = RepoDetailCacheStore::new(temp_dir.path());
        let mut store = RepoDetailStore::new(Some(disk.clone()));
        store.save(
            RepoDetailCache {
                open_pulls: Some(1),
                ..Default::default()
            },
            HOST,
            "a",
            "b",
        );
        assert!(disk.load(HOST, "a", "b").is_some());

        store.clear();
        assert!(disk.load(HOST, "a", "b").is_none());
        assert_eq!(store.load(HOST, "a", "b"), RepoDetailCache::default());
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let path = paths::repo_detail_path(temp_dir.path(), HOST, "a", "b");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let disk = RepoDetailCacheStore::new(temp_dir.path());
        assert!(disk.load(HOST, "a", "b").is_none());
    }
}
