// Error types for repobar.
// Splits remote API/cache failures from local working-copy failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoBarError {
    #[error("GitHub API error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {}", .reset_at.format("%H:%M:%S"))]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Endpoint cooling down until {}: {url}", .until.format("%H:%M:%S"))]
    CoolingDown { url: String, until: DateTime<Utc> },

    #[error("Missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl RepoBarError {
    /// Whether the failure means the token must be refreshed or re-entered.
    pub fn is_authentication(&self) -> bool {
        matches!(self, RepoBarError::Unauthorized | RepoBarError::MissingToken)
    }

    /// Reset time carried by throttling errors.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            RepoBarError::RateLimited { reset_at } => Some(*reset_at),
            RepoBarError::CoolingDown { until, .. } => Some(*until),
            _ => None,
        }
    }

    /// Single-line message suitable for an advisory line next to a repository.
    pub fn user_facing_message(&self) -> String {
        match self {
            RepoBarError::Http(e) if e.is_timeout() => "Request timed out".to_string(),
            RepoBarError::Http(e) if e.is_connect() => "Could not reach GitHub".to_string(),
            other => {
                let full = other.to_string();
                full.lines().next().unwrap_or(&full).to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RepoBarError>;

/// Result of a fetch whose output is shared between several waiters.
pub type SharedResult<T> = std::result::Result<T, Arc<RepoBarError>>;

/// Failures from inspecting or mutating a local working copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalGitError {
    #[error("No upstream branch is configured")]
    MissingUpstream,

    #[error("HEAD is detached")]
    DetachedHead,

    #[error("Working tree has uncommitted changes")]
    DirtyWorkingTree,

    #[error("Destination is not empty: {}", .0.display())]
    DestinationNotEmpty(PathBuf),

    #[error("git command failed: {}", .error.trim())]
    CommandFailed { output: String, error: String },

    #[error("Failed to launch git: {0}")]
    Launch(String),
}

pub type GitResult<T> = std::result::Result<T, LocalGitError>;
