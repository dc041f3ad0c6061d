// Recent-item lists shown under each repository.
// One coalescing cache per list kind, exposed through per-kind descriptors.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::RecentListCache;
use crate::config::RecentListsConfig;
use crate::error::{RepoBarError, Result, SharedResult};
use crate::github::{
    Release, RepoApi, RepoBranchSummary, RepoCommitSummary, RepoContributorSummary,
    RepoDiscussionSummary, RepoIssueSummary, RepoPullRequestSummary, RepoTagSummary, WorkflowRun,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecentMenuKind {
    Commits,
    Issues,
    PullRequests,
    Releases,
    CiRuns,
    Discussions,
    Tags,
    Branches,
    Contributors,
}

impl RecentMenuKind {
    pub const ALL: [RecentMenuKind; 9] = [
        RecentMenuKind::Commits,
        RecentMenuKind::Issues,
        RecentMenuKind::PullRequests,
        RecentMenuKind::Releases,
        RecentMenuKind::CiRuns,
        RecentMenuKind::Discussions,
        RecentMenuKind::Tags,
        RecentMenuKind::Branches,
        RecentMenuKind::Contributors,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "commits" => Some(Self::Commits),
            "issues" => Some(Self::Issues),
            "pulls" | "pullrequests" | "prs" => Some(Self::PullRequests),
            "releases" => Some(Self::Releases),
            "ci" | "ciruns" | "runs" => Some(Self::CiRuns),
            "discussions" => Some(Self::Discussions),
            "tags" => Some(Self::Tags),
            "branches" => Some(Self::Branches),
            "contributors" => Some(Self::Contributors),
            _ => None,
        }
    }
}

/// Titles per kind.
static MENU_TITLES: [(RecentMenuKind, &str, &str); 9] = [
    (RecentMenuKind::Commits, "Commits", "No commits"),
    (RecentMenuKind::Issues, "Open Issues", "No open issues"),
    (RecentMenuKind::PullRequests, "Open Pull Requests", "No open pull requests"),
    (RecentMenuKind::Releases, "Releases", "No releases"),
    (RecentMenuKind::CiRuns, "Actions", "No CI runs"),
    (RecentMenuKind::Discussions, "Discussions", "No discussions"),
    (RecentMenuKind::Tags, "Tags", "No tags"),
    (RecentMenuKind::Branches, "Branches", "No branches"),
    (RecentMenuKind::Contributors, "Contributors", "No contributors"),
];

/// A loaded list of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecentItems {
    Commits(Vec<RepoCommitSummary>),
    Issues(Vec<RepoIssueSummary>),
    PullRequests(Vec<RepoPullRequestSummary>),
    Releases(Vec<Release>),
    WorkflowRuns(Vec<WorkflowRun>),
    Discussions(Vec<RepoDiscussionSummary>),
    Tags(Vec<RepoTagSummary>),
    Branches(Vec<RepoBranchSummary>),
    Contributors(Vec<RepoContributorSummary>),
}

impl RecentItems {
    pub fn len(&self) -> usize {
        match self {
            RecentItems::Commits(items) => items.len(),
            RecentItems::Issues(items) => items.len(),
            RecentItems::PullRequests(items) => items.len(),
            RecentItems::Releases(items) => items.len(),
            RecentItems::WorkflowRuns(items) => items.len(),
            RecentItems::Discussions(items) => items.len(),
            RecentItems::Tags(items) => items.len(),
            RecentItems::Branches(items) => items.len(),
            RecentItems::Contributors(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the list caches and the API handle used to fill them.
pub struct RecentMenuService {
    api: Arc<dyn RepoApi>,
    list_limit: usize,
    cache_ttl: Duration,
    load_timeout: Duration,
    commits: RecentListCache<RepoCommitSummary>,
    issues: RecentListCache<RepoIssueSummary>,
    pull_requests: RecentListCache<RepoPullRequestSummary>,
    releases: RecentListCache<Release>,
    workflow_runs: RecentListCache<WorkflowRun>,
    discussions: RecentListCache<RepoDiscussionSummary>,
    tags: RecentListCache<RepoTagSummary>,
    branches: RecentListCache<RepoBranchSummary>,
    contributors: RecentListCache<RepoContributorSummary>,
    commit_counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl RecentMenuService {
    pub fn new(api: Arc<dyn RepoApi>, config: &RecentListsConfig) -> Self {
        Self {
            api,
            list_limit: config.limit,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            commits: RecentListCache::new(),
            issues: RecentListCache::new(),
            pull_requests: RecentListCache::new(),
            releases: RecentListCache::new(),
            workflow_runs: RecentListCache::new(),
            discussions: RecentListCache::new(),
            tags: RecentListCache::new(),
            branches: RecentListCache::new(),
            contributors: RecentListCache::new(),
            commit_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn list_limit(&self) -> usize {
        self.list_limit
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn descriptor(&self, kind: RecentMenuKind) -> Option<RecentMenuDescriptor<'_>> {
        MENU_TITLES
            .iter()
            .find(|(k, _, _)| *k == kind)
            .map(|&(kind, header_title, empty_title)| RecentMenuDescriptor {
                kind,
                header_title,
                empty_title,
                service: self,
            })
    }

    pub fn descriptors(&self) -> Vec<RecentMenuDescriptor<'_>> {
        RecentMenuKind::ALL
            .iter()
            .filter_map(|kind| self.descriptor(*kind))
            .collect()
    }

    /// Item count of whatever is stored for `full_name`, fresh or not.
    pub fn cached_recent_list_count(&self, full_name: &str, kind: RecentMenuKind) -> Option<usize> {
        self.descriptor(kind)?.stale(full_name).map(|items| items.len())
    }

    /// Total commit count reported by the API, else the number of stored commits.
    pub fn cached_recent_commit_count(&self, full_name: &str) -> Option<u64> {
        let total = self
            .commit_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(full_name)
            .copied();
        total.or_else(|| self.commits.stale(full_name).map(|items| items.len() as u64))
    }

    /// Load `kind` for `owner/name` with the configured limit.
    pub async fn load(
        &self,
        kind: RecentMenuKind,
        owner: &str,
        name: &str,
    ) -> SharedResult<RecentItems> {
        let key = format!("{}/{}", owner, name);
        match self.descriptor(kind) {
            Some(descriptor) => descriptor.load(&key, owner, name, self.list_limit).await,
            None => Err(Arc::new(RepoBarError::Other(format!(
                "No list for {:?}",
                kind
            )))),
        }
    }

    async fn load_list<Item, F, Fut>(
        &self,
        cache: &RecentListCache<Item>,
        key: &str,
        factory: F,
    ) -> SharedResult<Vec<Item>>
    where
        Item: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Item>>> + Send + 'static,
    {
        let task = cache.task(key, factory);
        let outcome = tokio::time::timeout(self.load_timeout, task).await;
        cache.clear_inflight(key);

        let items = match outcome {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("Loading {} timed out after {:?}", key, self.load_timeout);
                return Err(Arc::new(RepoBarError::Timeout(self.load_timeout)));
            }
        };
        cache.store(items.clone(), key, Utc::now());
        Ok(items)
    }
}

/// Per-kind view over a [`RecentMenuService`] list cache.
pub struct RecentMenuDescriptor<'a> {
    pub kind: RecentMenuKind,
    pub header_title: &'static str,
    pub empty_title: &'static str,
    service: &'a RecentMenuService,
}

impl RecentMenuDescriptor<'_> {
    pub fn cached(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Option<RecentItems> {
        let s = self.service;
        match self.kind {
            RecentMenuKind::Commits => s.commits.cached(key, now, ttl).map(RecentItems::Commits),
            RecentMenuKind::Issues => s.issues.cached(key, now, ttl).map(RecentItems::Issues),
            RecentMenuKind::PullRequests => s
                .pull_requests
                .cached(key, now, ttl)
                .map(RecentItems::PullRequests),
            RecentMenuKind::Releases => s.releases.cached(key, now, ttl).map(RecentItems::Releases),
            RecentMenuKind::CiRuns => s
                .workflow_runs
                .cached(key, now, ttl)
                .map(RecentItems::WorkflowRuns),
            RecentMenuKind::Discussions => s
                .discussions
                .cached(key, now, ttl)
                .map(RecentItems::Discussions),
            RecentMenuKind::Tags => s.tags.cached(key, now, ttl).map(RecentItems::Tags),
            RecentMenuKind::Branches => s.branches.cached(key, now, ttl).map(RecentItems::Branches),
            RecentMenuKind::Contributors => s
                .contributors
                .cached(key, now, ttl)
                .map(RecentItems::Contributors),
        }
    }

    pub fn stale(&self, key: &str) -> Option<RecentItems> {
        let s = self.service;
        match self.kind {
            RecentMenuKind::Commits => s.commits.stale(key).map(RecentItems::Commits),
            RecentMenuKind::Issues => s.issues.stale(key).map(RecentItems::Issues),
            RecentMenuKind::PullRequests => s.pull_requests.stale(key).map(RecentItems::PullRequests),
            RecentMenuKind::Releases => s.releases.stale(key).map(RecentItems::Releases),
            RecentMenuKind::CiRuns => s.workflow_runs.stale(key).map(RecentItems::WorkflowRuns),
            RecentMenuKind::Discussions => s.discussions.stale(key).map(RecentItems::Discussions),
            RecentMenuKind::Tags => s.tags.stale(key).map(RecentItems::Tags),
            RecentMenuKind::Branches => s.branches.stale(key).map(RecentItems::Branches),
            RecentMenuKind::Contributors => s.contributors.stale(key).map(RecentItems::Contributors),
        }
    }

    pub fn needs_refresh(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        let s = self.service;
        match self.kind {
            RecentMenuKind::Commits => s.commits.needs_refresh(key, now, ttl),
            RecentMenuKind::Issues => s.issues.needs_refresh(key, now, ttl),
            RecentMenuKind::PullRequests => s.pull_requests.needs_refresh(key, now, ttl),
            RecentMenuKind::Releases => s.releases.needs_refresh(key, now, ttl),
            RecentMenuKind::CiRuns => s.workflow_runs.needs_refresh(key, now, ttl),
            RecentMenuKind::Discussions => s.discussions.needs_refresh(key, now, ttl),
            RecentMenuKind::Tags => s.tags.needs_refresh(key, now, ttl),
            RecentMenuKind::Branches => s.branches.needs_refresh(key, now, ttl),
            RecentMenuKind::Contributors => s.contributors.needs_refresh(key, now, ttl),
        }
    }

    /// Join or start the fetch for `key`, bounded by the service's load timeout.
    pub async fn load(
        &self,
        key: &str,
        owner: &str,
        name: &str,
        limit: usize,
    ) -> SharedResult<RecentItems> {
        let s = self.service;
        let api = Arc::clone(&s.api);
        let (owner, name) = (owner.to_string(), name.to_string());

        match self.kind {
            RecentMenuKind::Commits => {
                let counts = Arc::clone(&s.commit_counts);
                let count_key = key.to_string();
                s.load_list(&s.commits, key, move || async move {
                    let list = api.recent_commits(&owner, &name, limit).await?;
                    let total = list.total_count.unwrap_or(list.items.len() as u64);
                    counts
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(count_key, total);
                    Ok(list.items)
                })
                .await
                .map(RecentItems::Commits)
            }
            RecentMenuKind::Issues => s
                .load_list(&s.issues, key, move || async move {
                    api.recent_issues(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Issues),
            RecentMenuKind::PullRequests => s
                .load_list(&s.pull_requests, key, move || async move {
                    api.recent_pull_requests(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::PullRequests),
            RecentMenuKind::Releases => s
                .load_list(&s.releases, key, move || async move {
                    api.recent_releases(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Releases),
            RecentMenuKind::CiRuns => s
                .load_list(&s.workflow_runs, key, move || async move {
                    api.recent_workflow_runs(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::WorkflowRuns),
            RecentMenuKind::Discussions => s
                .load_list(&s.discussions, key, move || async move {
                    api.recent_discussions(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Discussions),
            RecentMenuKind::Tags => s
                .load_list(&s.tags, key, move || async move {
                    api.recent_tags(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Tags),
            RecentMenuKind::Branches => s
                .load_list(&s.branches, key, move || async move {
                    api.recent_branches(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Branches),
            RecentMenuKind::Contributors => s
                .load_list(&s.contributors, key, move || async move {
                    api.top_contributors(&owner, &name, limit).await
                })
                .await
                .map(RecentItems::Contributors),
        }
    }
}
