// GitHub API response types.
// Defines structs for deserializing GitHub responses and the cached values derived from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// GitHub user or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub id: u64,
    pub login: String,
    pub avatar_url: Option<String>,
}

/// Repository details as returned by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoItem {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    /// Includes open pull requests.
    #[serde(default)]
    pub open_issues_count: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Absent on some responses (e.g. older enterprise servers).
    pub has_discussions: Option<bool>,
}

/// Summarised CI state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Passing,
    Failing,
    Pending,
    #[default]
    Unknown,
}

impl CiStatus {
    /// Status implied by the newest workflow run.
    pub fn from_run(run: &WorkflowRun) -> Self {
        match run.status {
            RunStatus::Completed => match run.conclusion {
                Some(RunConclusion::Success) => CiStatus::Passing,
                Some(
                    RunConclusion::Failure
                    | RunConclusion::TimedOut
                    | RunConclusion::StartupFailure,
                ) => CiStatus::Failing,
                _ => CiStatus::Unknown,
            },
            RunStatus::Queued
            | RunStatus::InProgress
            | RunStatus::Waiting
            | RunStatus::Requested
            | RunStatus::Pending => CiStatus::Pending,
            RunStatus::Unknown => CiStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CiStatusDetails {
    pub status: CiStatus,
    pub run_count: Option<u64>,
}

/// GitHub Actions workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub run_number: u64,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub head_branch: Option<String>,
    pub event: Option<String>,
    pub actor: Option<Owner>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

/// Workflow run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

/// Workflow run conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    StartupFailure,
    #[serde(other)]
    Unknown,
}

/// One entry of a repository's activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub title: String,
    pub actor: String,
    pub date: DateTime<Utc>,
    pub url: Option<String>,
    pub event_type: String,
}

impl ActivityEvent {
    pub fn line(&self) -> String {
        format!("{}: {}", self.actor, self.title)
    }
}

/// Recent activity plus the event considered most relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub events: Vec<ActivityEvent>,
    pub latest: Option<ActivityEvent>,
}

/// Two-week traffic totals (requires push access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrafficStats {
    pub views: u64,
    pub unique_visitors: u64,
    pub clones: u64,
    pub unique_cloners: u64,
}

/// Commit count for a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub download_count: u64,
}

/// GitHub release, including prereleases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: Option<String>,
    pub tag_name: String,
    pub html_url: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    pub author: Option<Owner>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.tag_name,
        }
    }

    pub fn download_count(&self) -> u64 {
        self.assets.iter().map(|asset| asset.download_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Open issue from `GET /repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoIssueSummary {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    pub user: Option<Owner>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    /// Present when the issue is actually a pull request.
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// Open pull request from `GET /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPullRequestSummary {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    pub user: Option<Owner>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    pub head: BranchRef,
    pub base: BranchRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCommitSummary {
    pub sha: String,
    pub message: String,
    pub url: String,
    pub authored_at: Option<DateTime<Utc>>,
    pub author_name: Option<String>,
    pub author_login: Option<String>,
}

impl RepoCommitSummary {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

/// Commits plus the total count when the API reports one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoCommitList {
    pub items: Vec<RepoCommitSummary>,
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDiscussionSummary {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub author_login: Option<String>,
    pub comment_count: u64,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTagSummary {
    pub name: String,
    pub commit: CommitRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoBranchSummary {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
    pub commit: CommitRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoContributorSummary {
    pub login: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub contributions: u64,
}
