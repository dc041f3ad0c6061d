// Local clone state.
// Sync-state resolution, per-clone status, the scan index, and origin remote parsing.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::sync::Repository;

/// Branch name reported for a detached HEAD.
pub const DETACHED_BRANCH: &str = "detached";

/// Relationship between a clone and its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalSyncState {
    Synced,
    Behind,
    Ahead,
    Diverged,
    Dirty,
    Unknown,
}

impl LocalSyncState {
    /// Pure resolution from cleanliness and ahead/behind counts.
    ///
    /// Dirty wins over everything; missing counts (no upstream) are `Unknown`.
    pub fn resolve(is_clean: bool, ahead: Option<u32>, behind: Option<u32>) -> Self {
        if !is_clean {
            return LocalSyncState::Dirty;
        }
        match (ahead, behind) {
            (Some(0), Some(0)) => LocalSyncState::Synced,
            (Some(0), Some(_)) => LocalSyncState::Behind,
            (Some(_), Some(0)) => LocalSyncState::Ahead,
            (Some(_), Some(_)) => LocalSyncState::Diverged,
            _ => LocalSyncState::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LocalSyncState::Synced => "Up to date",
            LocalSyncState::Behind => "Behind",
            LocalSyncState::Ahead => "Ahead",
            LocalSyncState::Diverged => "Diverged",
            LocalSyncState::Dirty => "Dirty",
            LocalSyncState::Unknown => "No upstream",
        }
    }
}

/// Snapshot of one local clone, derived fresh from git on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalRepoStatus {
    pub path: PathBuf,
    pub name: String,
    /// `owner/name` from the origin remote.
    pub full_name: Option<String>,
    pub branch: String,
    pub is_clean: bool,
    pub ahead_count: Option<u32>,
    pub behind_count: Option<u32>,
    pub sync_state: LocalSyncState,
}

impl LocalRepoStatus {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }

    pub fn sync_detail(&self) -> String {
        match self.sync_state {
            LocalSyncState::Behind => match self.behind_count {
                Some(n) => format!("Behind {}", n),
                None => "Behind".to_string(),
            },
            LocalSyncState::Ahead => match self.ahead_count {
                Some(n) => format!("Ahead {}", n),
                None => "Ahead".to_string(),
            },
            state => state.label().to_string(),
        }
    }

    /// Only a clean, strictly-behind clone on a named branch is fast-forwarded unattended.
    pub fn can_auto_sync(&self) -> bool {
        self.is_clean
            && self.sync_state == LocalSyncState::Behind
            && self.ahead_count.unwrap_or(0) == 0
            && self.branch != DETACHED_BRANCH
    }
}

/// Read-only result of one scan, with lookups by full and bare name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalRepoIndex {
    all: Vec<LocalRepoStatus>,
    by_full_name: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl LocalRepoIndex {
    pub fn new(statuses: Vec<LocalRepoStatus>) -> Self {
        let mut by_full_name = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, status) in statuses.iter().enumerate() {
            if let Some(full_name) = &status.full_name {
                by_full_name.entry(full_name.clone()).or_insert(i);
            }
            by_name.entry(status.name.clone()).or_default().push(i);
        }
        Self {
            all: statuses,
            by_full_name,
            by_name,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[LocalRepoStatus] {
        &self.all
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Exact `owner/name` match, else the only clone with that bare name.
    pub fn status_for_full_name(&self, full_name: &str) -> Option<&LocalRepoStatus> {
        if let Some(&i) = self.by_full_name.get(full_name) {
            return self.all.get(i);
        }
        let name = full_name.rsplit('/').next()?;
        self.unique_status_for_name(name)
    }

    pub fn status_for(&self, repository: &Repository) -> Option<&LocalRepoStatus> {
        if let Some(&i) = self.by_full_name.get(&repository.full_name()) {
            return self.all.get(i);
        }
        self.unique_status_for_name(&repository.name)
    }

    fn unique_status_for_name(&self, name: &str) -> Option<&LocalRepoStatus> {
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([only]) => self.all.get(*only),
            _ => None,
        }
    }
}

/// Host, owner, and repository parsed from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRemote {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl GitRemote {
    /// Parse `scheme://host/owner/repo(.git)` or SCP-style `user@host:owner/repo(.git)`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.contains("://") {
            Self::parse_url(value)
        } else {
            Self::parse_scp(value)
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    fn parse_url(value: &str) -> Option<Self> {
        let url = reqwest::Url::parse(value).ok()?;
        let host = url.host_str()?.to_string();
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        Self::from_segments(host, &segments)
    }

    fn parse_scp(value: &str) -> Option<Self> {
        let (host_part, path) = value.split_once(':')?;
        let host = host_part.rsplit('@').next().unwrap_or(host_part);
        if host.is_empty() {
            return None;
        }
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Self::from_segments(host.to_string(), &segments)
    }

    fn from_segments(host: String, segments: &[&str]) -> Option<Self> {
        let [.., owner, name] = segments else {
            return None;
        };
        let name = name.strip_suffix(".git").unwrap_or(*name);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            host,
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}
