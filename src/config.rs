// Application configuration.
// Loads settings from config.json in the platform config directory, with env overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cache::RepoDetailCachePolicy;
use crate::error::{RepoBarError, Result};

/// Public GitHub API host.
pub const DEFAULT_API_HOST: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API base URL (GitHub Enterprise uses `https://host/api/v3`).
    pub api_host: String,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Upper bound for a single remote field fetch.
    pub fetch_timeout_secs: u64,
    pub detail_ttls: DetailTtlConfig,
    pub recent_lists: RecentListsConfig,
    pub local: LocalProjectsSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            cache_dir: None,
            fetch_timeout_secs: 30,
            detail_ttls: DetailTtlConfig::default(),
            recent_lists: RecentListsConfig::default(),
            local: LocalProjectsSettings::default(),
        }
    }
}

/// Per-field freshness windows for the repository detail cache, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailTtlConfig {
    pub open_pulls_secs: u64,
    pub ci_secs: u64,
    pub activity_secs: u64,
    pub traffic_secs: u64,
    pub heatmap_secs: u64,
    pub release_secs: u64,
    pub discussions_secs: u64,
}

impl Default for DetailTtlConfig {
    fn default() -> Self {
        Self {
            open_pulls_secs: 10 * 60,
            ci_secs: 2 * 60,
            activity_secs: 5 * 60,
            traffic_secs: 60 * 60,
            heatmap_secs: 6 * 60 * 60,
            release_secs: 30 * 60,
            discussions_secs: 24 * 60 * 60,
        }
    }
}

impl DetailTtlConfig {
    pub fn policy(&self) -> RepoDetailCachePolicy {
        RepoDetailCachePolicy {
            open_pulls_ttl: Duration::from_secs(self.open_pulls_secs),
            ci_ttl: Duration::from_secs(self.ci_secs),
            activity_ttl: Duration::from_secs(self.activity_secs),
            traffic_ttl: Duration::from_secs(self.traffic_secs),
            heatmap_ttl: Duration::from_secs(self.heatmap_secs),
            release_ttl: Duration::from_secs(self.release_secs),
            discussions_ttl: Duration::from_secs(self.discussions_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentListsConfig {
    /// Number of items requested per list.
    pub limit: usize,
    pub cache_ttl_secs: u64,
    pub load_timeout_secs: u64,
}

impl Default for RecentListsConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            cache_ttl_secs: 5 * 60,
            load_timeout_secs: 15,
        }
    }
}

/// Settings for scanning local clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProjectsSettings {
    pub root_path: Option<PathBuf>,
    pub max_depth: usize,
    pub auto_sync_enabled: bool,
}

impl Default for LocalProjectsSettings {
    fn default() -> Self {
        Self {
            root_path: None,
            max_depth: 2,
            auto_sync_enabled: false,
        }
    }
}

/// Path to the default config file.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "repobar").map(|dirs| dirs.config_dir().join("config.json"))
}

impl Config {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default().with_overrides(env_var)),
        }
    }

    /// Load from an explicit file. A missing file yields defaults.
    ///
    /// Environment overrides apply on top of the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&contents)?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        Ok(config.with_overrides(lookup))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("REPOBAR_API_HOST") {
            let host = host.trim().trim_end_matches('/');
            if !host.is_empty() {
                self.api_host = host.to_string();
            }
        }
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Read the API token from `GITHUB_TOKEN`, falling back to `GH_TOKEN`.
pub fn token_from_env() -> Result<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|token| !token.trim().is_empty())
        .ok_or(RepoBarError::MissingToken)
}
