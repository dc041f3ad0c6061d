// Repository refresh orchestration.
// Fetches only stale detail fields, in parallel, and folds partial failures into one advisory error.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{RepoDetailCacheStore, RepoDetailCachePolicy, RepoDetailStore};
use crate::config::Config;
use crate::error::{RepoBarError, Result};
use crate::github::{RepoApi, RepoItem};

use super::repository::Repository;

/// Number of events requested for the activity feed.
pub const ACTIVITY_LIMIT: usize = 25;

/// Folds errors from parallel fetches into one message and one rate-limit hint.
///
/// The most recently absorbed error wins. A rate-limit hint is only replaced
/// by a newer error that carries one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoErrorAccumulator {
    pub message: Option<String>,
    pub rate_limit: Option<DateTime<Utc>>,
}

impl RepoErrorAccumulator {
    pub fn absorb(&mut self, error: &RepoBarError) {
        self.message = Some(error.user_facing_message());
        if let Some(reset) = error.rate_limit_reset() {
            self.rate_limit = Some(reset);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }
}

/// Builds merged repository snapshots on top of the per-field detail cache.
pub struct RepoDetailCoordinator {
    api: Arc<dyn RepoApi>,
    policy: RepoDetailCachePolicy,
    store: Mutex<RepoDetailStore>,
    fetch_timeout: Duration,
}

impl RepoDetailCoordinator {
    pub fn new(api: Arc<dyn RepoApi>, policy: RepoDetailCachePolicy, store: RepoDetailStore) -> Self {
        Self {
            api,
            policy,
            store: Mutex::new(store),
            fetch_timeout: Duration::from_secs(30),
        }
    }

    /// Coordinator with TTLs, timeout, and cache location taken from `config`.
    pub fn from_config(api: Arc<dyn RepoApi>, config: &Config) -> Self {
        let disk = match &config.cache_dir {
            Some(dir) => Some(RepoDetailCacheStore::new(dir.clone())),
            None => RepoDetailCacheStore::default_location(),
        };
        if disk.is_none() {
            log::warn!("No cache directory available, repository details are kept in memory only");
        }
        Self::new(api, config.detail_ttls.policy(), RepoDetailStore::new(disk))
            .with_fetch_timeout(config.fetch_timeout())
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RepoDetailCachePolicy {
        &self.policy
    }

    pub async fn full_repository(&self, owner: &str, name: &str) -> Repository {
        self.full_repository_at(owner, name, Utc::now()).await
    }

    /// Refresh one repository as of `now`.
    ///
    /// Only a failure of the base details request short-circuits, yielding a
    /// placeholder. Every other failure falls back to the cached value.
    pub async fn full_repository_at(&self, owner: &str, name: &str, now: DateTime<Utc>) -> Repository {
        let mut accumulator = RepoErrorAccumulator::default();

        let details = match self.bounded(self.api.repo_details(owner, name)).await {
            Ok(details) => details,
            Err(e) => {
                log::warn!("Failed to fetch {}/{}: {}", owner, name, e);
                accumulator.absorb(&e);
                return Repository::placeholder(
                    owner,
                    name,
                    accumulator.message,
                    accumulator.rate_limit,
                );
            }
        };

        let owner = details.owner.login.as_str();
        let name = details.name.as_str();
        let api_host = self.api.api_host();
        let mut cache = self.store().load(&api_host, owner, name);
        let mut dirty = false;

        if let Some(enabled) = details.has_discussions {
            if cache.discussions_enabled != Some(enabled) {
                log::info!(
                    "Discussions capability {} for {}/{} source=repoDetails",
                    if enabled { "enabled" } else { "disabled" },
                    owner,
                    name
                );
            }
            cache.discussions_enabled = Some(enabled);
            cache.discussions_checked_at = Some(now);
            dirty = true;
        }

        let state = self.policy.state(&cache, now);
        log::debug!(
            "Refreshing {}/{}: {} stale field(s)",
            owner,
            name,
            state.stale_field_count()
        );

        let api = self.api.as_ref();
        let (pulls, ci, activity, traffic, heatmap, release) = tokio::join!(
            self.refresh_if(state.open_pulls.needs_refresh, api.open_pull_request_count(owner, name)),
            self.refresh_if(state.ci.needs_refresh, api.ci_status(owner, name)),
            self.refresh_if(
                state.activity.needs_refresh,
                api.recent_activity(owner, name, ACTIVITY_LIMIT)
            ),
            self.refresh_if(state.traffic.needs_refresh, api.traffic_stats(owner, name)),
            self.refresh_if(state.heatmap.needs_refresh, api.commit_heatmap(owner, name)),
            self.refresh_if(state.release.needs_refresh, api.latest_release_any(owner, name)),
        );

        if let Some(open_pulls) = settle(pulls, &mut accumulator, "open pulls") {
            cache.open_pulls = Some(open_pulls);
            cache.open_pulls_fetched_at = Some(now);
            dirty = true;
        }
        if let Some(ci) = settle(ci, &mut accumulator, "ci") {
            cache.ci_details = Some(ci);
            cache.ci_fetched_at = Some(now);
            dirty = true;
        }
        if let Some(snapshot) = settle(activity, &mut accumulator, "activity") {
            cache.latest_activity = snapshot.latest.or_else(|| snapshot.events.first().cloned());
            cache.activity_events = Some(snapshot.events);
            cache.activity_fetched_at = Some(now);
            dirty = true;
        }
        if let Some(traffic) = settle(traffic, &mut accumulator, "traffic") {
            cache.traffic = traffic;
            cache.traffic_fetched_at = Some(now);
            dirty = true;
        }
        if let Some(heatmap) = settle(heatmap, &mut accumulator, "heatmap") {
            cache.heatmap = Some(heatmap);
            cache.heatmap_fetched_at = Some(now);
            dirty = true;
        }
        if let Some(release) = settle(release, &mut accumulator, "release") {
            cache.latest_release = release;
            cache.release_fetched_at = Some(now);
            dirty = true;
        }

        let final_state = self.policy.state(&cache, now);
        let open_pulls = cache.open_pulls.unwrap_or(0);
        let ci = cache.ci_details.clone().unwrap_or_default();

        let repository = Repository {
            open_pulls,
            open_issues: details.open_issues_count.saturating_sub(open_pulls),
            ci_status: ci.status,
            ci_run_count: ci.run_count,
            latest_release: cache.latest_release.clone(),
            latest_activity: cache.latest_activity.clone(),
            activity_events: cache.activity_events.clone().unwrap_or_default(),
            traffic: cache.traffic,
            heatmap: cache.heatmap.clone().unwrap_or_default(),
            error: accumulator.message,
            rate_limited_until: accumulator.rate_limit,
            detail_cache_state: Some(final_state),
            discussions_enabled: cache.discussions_enabled,
            ..Repository::from_item(&details)
        };

        if dirty {
            self.store().save(cache, &api_host, owner, name);
        }

        repository
    }

    /// Drop every cached detail, in memory and on disk.
    pub fn clear_cache(&self) {
        log::info!("Clearing repo detail cache (disk + memory)");
        self.store().clear();
    }

    /// Discussions flag if it was checked within the policy's TTL.
    pub fn cached_discussions_enabled(
        &self,
        owner: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        let api_host = self.api.api_host();
        self.store()
            .discussions_enabled(&api_host, owner, name, now, self.policy.discussions_ttl)
    }

    pub fn update_discussions_capability(
        &self,
        owner: &str,
        name: &str,
        enabled: bool,
        checked_at: DateTime<Utc>,
        source: &str,
    ) {
        let api_host = self.api.api_host();
        let updated = self
            .store()
            .update_discussions_enabled(&api_host, owner, name, enabled, checked_at);
        if updated {
            log::info!(
                "Discussions capability {} for {}/{} source={}",
                if enabled { "enabled" } else { "disabled" },
                owner,
                name,
                source
            );
        }
    }

    /// Apply the discussions flag from a bulk listing. Returns how many entries changed.
    pub fn update_discussions_capability_from(
        &self,
        items: &[RepoItem],
        checked_at: DateTime<Utc>,
        source: &str,
    ) -> usize {
        let api_host = self.api.api_host();
        let mut store = self.store();
        let updated = items
            .iter()
            .filter_map(|item| item.has_discussions.map(|enabled| (item, enabled)))
            .filter(|(item, enabled)| {
                store.update_discussions_enabled(
                    &api_host,
                    &item.owner.login,
                    &item.name,
                    *enabled,
                    checked_at,
                )
            })
            .count();
        if updated > 0 {
            log::info!(
                "Updated discussions capability for {} repos source={}",
                updated,
                source
            );
        }
        updated
    }

    async fn bounded<T>(&self, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .unwrap_or(Err(RepoBarError::Timeout(self.fetch_timeout)))
    }

    /// Run `fetch` only when the field is stale. `None` means the cache was fresh.
    async fn refresh_if<T>(
        &self,
        stale: bool,
        fetch: impl Future<Output = Result<T>>,
    ) -> Option<Result<T>> {
        if stale {
            Some(self.bounded(fetch).await)
        } else {
            None
        }
    }

    fn store(&self) -> MutexGuard<'_, RepoDetailStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fresh value from a completed fetch; failures go to the accumulator.
fn settle<T>(
    outcome: Option<Result<T>>,
    accumulator: &mut RepoErrorAccumulator,
    field: &str,
) -> Option<T> {
    match outcome? {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Keeping cached {} after error: {}", field, e);
            accumulator.absorb(&e);
            None
        }
    }
}
